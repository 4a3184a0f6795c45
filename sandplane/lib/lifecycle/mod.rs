//! The sandbox lifecycle coordinator.
//!
//! [`SandboxService`] owns the state machine of a sandbox: create, pause, resume, kill, keep-alive
//! and metadata updates. It consults admission control before touching the node fabric, keeps the
//! registry in step with the nodes and moves sandboxes between the registry and the snapshot
//! store. A sandbox lives in exactly one of the two once its creation completes.

mod create;
mod kill;
mod pause;
mod reaper;
mod resume;
mod service;
mod sync;
mod update;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use create::*;
pub use kill::*;
pub use resume::*;
pub use service::*;

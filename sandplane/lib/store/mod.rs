//! Durable storage for teams, templates, builds and paused snapshots.

mod db;
mod seed;
mod snapshots;
mod teams;
mod templates;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use db::*;
pub use seed::*;
pub use snapshots::*;
pub use teams::*;
pub use templates::*;

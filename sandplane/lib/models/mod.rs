//! Models for the sandplane control plane.
//!
//! This module contains the data structures shared by the registry, the stores, the lifecycle
//! coordinator and the HTTP surface.

mod sandbox;
mod snapshot;
mod team;
mod template;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use sandbox::*;
pub use snapshot::*;
pub use team::*;
pub use template::*;

//! Configuration types and helpers.

mod defaults;
mod plane;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use defaults::*;
pub use plane::*;

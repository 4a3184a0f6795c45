//! Utility functions and types.

mod env;
mod path;
mod time;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use path::*;
pub use time::*;

//! Command-line interface of the `sandplane` binary.

mod args;
mod styles;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use args::*;
pub use styles::*;

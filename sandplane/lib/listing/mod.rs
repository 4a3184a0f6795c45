//! The merged, cursor-paginated view over running and paused sandboxes.
//!
//! Running sandboxes live in the in-memory registry and paused ones in the database. Both sources
//! are ordered by the same key, newest start time first and sandbox id ascending within a start
//! time, and the same cursor predicate is applied to each of them, so the pages of the merged view
//! have no gaps or duplicates.

mod cursor;
mod engine;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use cursor::*;
pub use engine::*;

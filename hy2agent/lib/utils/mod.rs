//! Utility functions and types.

mod env;
mod file;
mod path;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use env::*;
pub use file::*;
pub use path::*;

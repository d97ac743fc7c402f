//! Observing and driving the managed daemon on the host.

mod health;
mod host;
mod lifecycle;
mod logs;
mod parse;
mod probe;

#[cfg(test)]
pub(crate) mod testing;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use health::*;
pub use host::*;
pub use lifecycle::*;
pub use logs::*;
pub use parse::*;
pub use probe::*;

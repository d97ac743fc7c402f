//! Management of the daemon's configuration file and its backups.

mod backup;
mod daemon_config;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use backup::*;
pub use daemon_config::*;

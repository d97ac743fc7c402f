//! Agent configuration and the persisted access policy.

mod agent;
mod defaults;
mod policy;

//--------------------------------------------------------------------------------------------------
// Exports
//--------------------------------------------------------------------------------------------------

pub use agent::*;
pub use defaults::*;
pub use policy::*;

use std::{env, path::PathBuf};

use crate::config::DEFAULT_AGENT_HOME;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Environment variable that overrides the agent home directory.
pub const AGENT_HOME_ENV_VAR: &str = "HY2AGENT_HOME";

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the agent home directory.
///
/// Uses `HY2AGENT_HOME` when set, otherwise falls back to the default system location.
pub fn agent_home_path() -> PathBuf {
    match env::var(AGENT_HOME_ENV_VAR) {
        Ok(home) if !home.is_empty() => PathBuf::from(home),
        _ => DEFAULT_AGENT_HOME.clone(),
    }
}

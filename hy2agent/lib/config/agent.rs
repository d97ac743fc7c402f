use std::{path::PathBuf, time::Duration};

use getset::Getters;
use typed_builder::TypedBuilder;

use crate::utils;

use super::{
    DEFAULT_DAEMON_BINARY, DEFAULT_HYSTERIA_CONFIG_PATH, DEFAULT_INSTALL_SCRIPT_URL,
    DEFAULT_MAX_BACKUPS, DEFAULT_RELEASES_URL, DEFAULT_REQUEST_TIMEOUT, DEFAULT_SERVICE_UNIT,
    DEFAULT_VERIFY_ATTEMPTS, DEFAULT_VERIFY_DELAY, DEFAULT_VERSIONS_CACHE_TTL,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Runtime settings for the agent.
///
/// Everything has a default, so `AgentConfig::builder().build()` describes a stock host.
#[derive(Debug, Clone, TypedBuilder, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AgentConfig {
    /// Directory holding the policy document and the release cache.
    #[builder(default = utils::agent_home_path(), setter(into))]
    home_dir: PathBuf,

    /// The daemon's configuration file.
    #[builder(default = DEFAULT_HYSTERIA_CONFIG_PATH.clone(), setter(into))]
    hysteria_config_path: PathBuf,

    /// Directory backups are written to. Defaults to the config file's directory.
    #[builder(default, setter(strip_option, into))]
    backup_dir: Option<PathBuf>,

    /// The systemd unit of the daemon.
    #[builder(default = DEFAULT_SERVICE_UNIT.to_string(), setter(into))]
    service_unit: String,

    /// The daemon executable name or path.
    #[builder(default = DEFAULT_DAEMON_BINARY.to_string(), setter(into))]
    daemon_binary: String,

    /// The vendor installer script.
    #[builder(default = DEFAULT_INSTALL_SCRIPT_URL.to_string(), setter(into))]
    install_script_url: String,

    /// The upstream release listing.
    #[builder(default = DEFAULT_RELEASES_URL.to_string(), setter(into))]
    releases_url: String,

    /// Number of config backups to keep.
    #[builder(default = DEFAULT_MAX_BACKUPS)]
    max_backups: usize,

    /// How many times to poll the service after start or restart.
    #[builder(default = DEFAULT_VERIFY_ATTEMPTS)]
    verify_attempts: u32,

    /// Delay before each poll.
    #[builder(default = DEFAULT_VERIFY_DELAY)]
    verify_delay: Duration,

    /// Freshness window of the cached release list.
    #[builder(default = DEFAULT_VERSIONS_CACHE_TTL)]
    versions_cache_ttl: Duration,

    /// Deadline applied to slow-path API requests.
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    request_timeout: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AgentConfig {
    /// Returns the path of the policy document.
    pub fn policy_path(&self) -> PathBuf {
        self.home_dir.join(utils::POLICY_FILENAME)
    }

    /// Returns the path of the release list cache.
    pub fn versions_cache_path(&self) -> PathBuf {
        self.home_dir.join(utils::VERSIONS_CACHE_FILENAME)
    }

    /// Returns the directory backups live in.
    pub fn resolved_backup_dir(&self) -> PathBuf {
        match &self.backup_dir {
            Some(dir) => dir.clone(),
            None => self
                .hysteria_config_path
                .parent()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

use std::{sync::Arc, time::Duration};

use getset::Getters;

use crate::{
    config::{AgentConfig, PolicyStore},
    management::{BackupStore, ConfigManager},
    release::ReleaseFeed,
    runtime::{
        DaemonBinary, DaemonInstaller, HysteriaBinary, LifecycleController, ScriptInstaller,
        ServiceProbe, ServiceSupervisor, Systemd, VerifyPolicy,
    },
    stats::StatsCollector,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Shared state handed to every request handler and to the access gate.
#[derive(Clone, Getters)]
#[getset(get = "pub with_prefix")]
pub struct AgentState {
    /// The access policy.
    policy: Arc<PolicyStore>,

    /// The host service supervisor, used directly for journal reads.
    supervisor: Arc<dyn ServiceSupervisor>,

    /// Read-only daemon status.
    probe: ServiceProbe,

    /// Daemon lifecycle transitions and installer operations.
    lifecycle: Arc<LifecycleController>,

    /// The daemon configuration file.
    config: Arc<ConfigManager>,

    /// Installable releases.
    releases: Arc<ReleaseFeed>,

    /// Host statistics.
    stats: StatsCollector,

    /// Name of the daemon's service unit.
    service_unit: String,

    /// Deadline for slow lifecycle requests.
    request_timeout: Duration,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AgentState {
    /// Creates the state for a real host: systemd, the daemon on `PATH` and the vendor script.
    pub fn new(config: &AgentConfig, policy: Arc<PolicyStore>) -> Self {
        Self::with_host(
            config,
            policy,
            Arc::new(Systemd::new(config.get_service_unit())),
            Arc::new(HysteriaBinary::new(config.get_daemon_binary())),
            Arc::new(ScriptInstaller::new(config.get_install_script_url())),
        )
    }

    /// Creates the state over the given host capabilities.
    pub fn with_host(
        config: &AgentConfig,
        policy: Arc<PolicyStore>,
        supervisor: Arc<dyn ServiceSupervisor>,
        binary: Arc<dyn DaemonBinary>,
        installer: Arc<dyn DaemonInstaller>,
    ) -> Self {
        let probe = ServiceProbe::new(supervisor.clone(), binary);
        let lifecycle = Arc::new(LifecycleController::new(
            supervisor.clone(),
            installer,
            probe.clone(),
            VerifyPolicy {
                attempts: *config.get_verify_attempts(),
                delay: *config.get_verify_delay(),
            },
        ));

        let backups = BackupStore::new(
            config.get_hysteria_config_path(),
            config.resolved_backup_dir(),
            *config.get_max_backups(),
        );

        let releases = ReleaseFeed::new(
            config.get_releases_url(),
            config.versions_cache_path(),
            *config.get_versions_cache_ttl(),
        );

        Self {
            policy,
            supervisor,
            probe,
            config: Arc::new(ConfigManager::new(backups, lifecycle.clone())),
            lifecycle,
            releases: Arc::new(releases),
            stats: StatsCollector::new(),
            service_unit: config.get_service_unit().clone(),
            request_timeout: *config.get_request_timeout(),
        }
    }
}

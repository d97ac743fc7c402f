//! Lifecycle control of the managed daemon.
//!
//! Every transition is issued through the [`ServiceSupervisor`] and then verified:
//!
//! - `start` and `restart` poll the [`ServiceProbe`] up to `attempts` times, sleeping `delay`
//!   before each poll, and succeed as soon as the daemon is running.
//! - `stop` waits one `delay` and then asks the supervisor for the unit's active state directly.
//!
//! A command that cannot be issued fails immediately and is never retried.
//!
//! Transitions and installer runs take a shared lock, so at most one of them touches the daemon
//! at a time. [`LifecycleController::lock`] hands the same lock to callers that need to group
//! their own steps with a restart.

use std::{
    sync::{Arc, LazyLock},
    time::Duration,
};

use regex::Regex;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{DEFAULT_VERIFY_ATTEMPTS, DEFAULT_VERIFY_DELAY},
    AgentError, AgentResult,
};

use super::{CommandOutput, DaemonInstaller, ServiceProbe, ServiceState, ServiceSupervisor};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Accepted release tags: `v2.5.1`, `2.5.1`, `app/v2.5.1`, `v2.6.0-rc1`.
static VERSION_TAG_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:app/)?v?[0-9]+\.[0-9]+\.[0-9]+(?:[-+][A-Za-z0-9.]+)?$").unwrap()
});

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// How a start or restart is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    /// Number of status polls before giving up.
    pub attempts: u32,

    /// Delay before each poll.
    pub delay: Duration,
}

/// Drives the daemon through its lifecycle.
///
/// Clones share the transition lock.
#[derive(Clone)]
pub struct LifecycleController {
    supervisor: Arc<dyn ServiceSupervisor>,
    installer: Arc<dyn DaemonInstaller>,
    probe: ServiceProbe,
    policy: VerifyPolicy,
    transitions: Arc<Mutex<()>>,
}

/// Exclusive access to the daemon's lifecycle, released on drop.
pub struct TransitionGuard<'a> {
    _guard: MutexGuard<'a, ()>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LifecycleController {
    /// Creates a controller.
    pub fn new(
        supervisor: Arc<dyn ServiceSupervisor>,
        installer: Arc<dyn DaemonInstaller>,
        probe: ServiceProbe,
        policy: VerifyPolicy,
    ) -> Self {
        Self {
            supervisor,
            installer,
            probe,
            policy,
            transitions: Arc::new(Mutex::new(())),
        }
    }

    /// Waits for exclusive access to the daemon's lifecycle.
    pub async fn lock(&self, cancel: &CancellationToken) -> AgentResult<TransitionGuard<'_>> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AgentError::Cancelled),
            guard = self.transitions.lock() => Ok(TransitionGuard { _guard: guard }),
        }
    }

    /// Returns the probe used for verification.
    pub fn probe(&self) -> &ServiceProbe {
        &self.probe
    }

    /// Starts the daemon and waits until it is running.
    pub async fn start(&self, cancel: &CancellationToken) -> AgentResult<()> {
        let _guard = self.lock(cancel).await?;

        self.supervisor.start().await?;
        self.verify_running("start", cancel).await?;

        tracing::info!("hysteria service started");
        Ok(())
    }

    /// Stops the daemon and checks that the unit went inactive.
    pub async fn stop(&self, cancel: &CancellationToken) -> AgentResult<()> {
        let _guard = self.lock(cancel).await?;

        self.supervisor.stop().await?;
        wait(self.policy.delay, cancel).await?;

        match self.supervisor.is_active().await.as_str() {
            "inactive" => {
                tracing::info!("hysteria service stopped");
                Ok(())
            }
            "failed" => Err(AgentError::VerificationFailed {
                action: "stop".to_string(),
                reason: "service is in failed state".to_string(),
            }),
            "" | "unknown" => Err(AgentError::VerificationFailed {
                action: "stop".to_string(),
                reason: "service state is unknown".to_string(),
            }),
            other => Err(AgentError::VerificationFailed {
                action: "stop".to_string(),
                reason: format!("current state is {}", other),
            }),
        }
    }

    /// Restarts the daemon and waits until it is running again.
    pub async fn restart(&self, cancel: &CancellationToken) -> AgentResult<()> {
        let guard = self.lock(cancel).await?;
        self.restart_locked(&guard, cancel).await
    }

    /// Restarts the daemon under a lock the caller already holds.
    pub async fn restart_locked(
        &self,
        _guard: &TransitionGuard<'_>,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        self.supervisor.restart().await?;
        self.verify_running("restart", cancel).await?;

        tracing::info!("hysteria service restarted");
        Ok(())
    }

    /// Installs the daemon and enables it at boot.
    pub async fn install(&self) -> AgentResult<CommandOutput> {
        let output = self.run_installer("install", Vec::new()).await?;

        if let Err(e) = self.supervisor.enable().await {
            tracing::error!("installed but failed to enable service: {}", e);
            return Err(AgentError::InstallerFailed {
                operation: "enable".to_string(),
                output: output.output,
            });
        }

        Ok(output)
    }

    /// Removes the daemon.
    pub async fn uninstall(&self) -> AgentResult<CommandOutput> {
        self.run_installer("uninstall", vec!["--remove".to_string()])
            .await
    }

    /// Upgrades the daemon to the latest release.
    pub async fn upgrade(&self) -> AgentResult<CommandOutput> {
        self.run_installer("upgrade", Vec::new()).await
    }

    /// Installs a specific release tag.
    pub async fn install_version(&self, version: &str) -> AgentResult<CommandOutput> {
        let tag = normalize_version_tag(version)?;
        self.run_installer("install version", vec!["--version".to_string(), tag])
            .await
    }

    /// Polls the probe until the daemon runs or the attempts run out.
    async fn verify_running(&self, action: &str, cancel: &CancellationToken) -> AgentResult<()> {
        let mut last = None;

        for attempt in 1..=self.policy.attempts {
            wait(self.policy.delay, cancel).await?;

            let status = self.probe.snapshot().await;
            if status.state() == ServiceState::Running {
                return Ok(());
            }

            tracing::debug!(
                "{} verification attempt {}/{}: service is {}",
                action,
                attempt,
                self.policy.attempts,
                status.state().as_str()
            );
            last = Some(status);
        }

        let reason = match last {
            Some(status) if !status.last_error.is_empty() => status.last_error,
            Some(status) => format!("service is in {} state", status.state().as_str()),
            None => "service was never observed running".to_string(),
        };

        Err(AgentError::VerificationFailed {
            action: action.to_string(),
            reason,
        })
    }

    async fn run_installer(&self, operation: &str, args: Vec<String>) -> AgentResult<CommandOutput> {
        let _guard = self.transitions.lock().await;
        let output = self.installer.run(&args).await?;

        if !output.success {
            tracing::error!("{} failed", operation);
            return Err(AgentError::InstallerFailed {
                operation: operation.to_string(),
                output: output.output,
            });
        }

        tracing::info!("{} finished", operation);
        Ok(output)
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Validates a release tag and strips the `app/` prefix used by upstream tags.
pub fn normalize_version_tag(version: &str) -> AgentResult<String> {
    let version = version.trim();
    if !VERSION_TAG_REGEX.is_match(version) {
        return Err(AgentError::InvalidArgument(format!(
            "invalid version tag: {}",
            version
        )));
    }

    let tag = version.strip_prefix("app/").unwrap_or(version);
    if tag.starts_with('v') {
        Ok(tag.to_string())
    } else {
        Ok(format!("v{}", tag))
    }
}

async fn wait(delay: Duration, cancel: &CancellationToken) -> AgentResult<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(AgentError::Cancelled),
        _ = tokio::time::sleep(delay) => Ok(()),
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_VERIFY_ATTEMPTS,
            delay: DEFAULT_VERIFY_DELAY,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

use std::sync::Arc;

use serde::Serialize;

use crate::{AgentError, AgentResult};

use super::{
    parse_status_report, parse_version_banner, ActiveState, DaemonBinary, LoadState,
    ServiceState, ServiceSupervisor,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A point-in-time view of the daemon, derived fresh on every query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServiceStatus {
    /// Whether the daemon binary is on `PATH`.
    pub is_installed: bool,

    /// Whether the supervisor reports the unit as active.
    pub is_running: bool,

    /// Daemon version.
    pub version: String,

    /// Build date of the daemon binary.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_date: String,

    /// Build type of the daemon binary.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub build_type: String,

    /// Target OS of the daemon binary.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub platform: String,

    /// Target architecture of the daemon binary.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub architecture: String,

    /// The derived lifecycle state.
    #[serde(rename = "service_status", skip_serializing_if = "Option::is_none")]
    pub service_state: Option<ServiceState>,

    /// The first error line found in the status report.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_error: String,

    /// Whether the unit file is loaded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub load_state: Option<LoadState>,

    /// The unit's activation state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_state: Option<ActiveState>,
}

/// Read-only status derivation on top of the supervisor and the daemon binary.
#[derive(Clone)]
pub struct ServiceProbe {
    supervisor: Arc<dyn ServiceSupervisor>,
    binary: Arc<dyn DaemonBinary>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ServiceStatus {
    /// Returns the lifecycle state, `unknown` when it could not be derived.
    pub fn state(&self) -> ServiceState {
        self.service_state.unwrap_or_default()
    }
}

impl ServiceProbe {
    /// Creates a probe over the given host capabilities.
    pub fn new(supervisor: Arc<dyn ServiceSupervisor>, binary: Arc<dyn DaemonBinary>) -> Self {
        Self { supervisor, binary }
    }

    /// Returns true if the daemon binary is resolvable on `PATH`.
    pub fn installed(&self) -> bool {
        self.binary.is_installed()
    }

    /// Derives the current status.
    ///
    /// If the daemon is not installed, returns [`AgentError::NotInstalled`]. Use
    /// [`ServiceProbe::snapshot`] when a status is needed regardless.
    pub async fn status(&self) -> AgentResult<ServiceStatus> {
        let status = self.snapshot().await;
        if !status.is_installed {
            return Err(AgentError::NotInstalled);
        }

        Ok(status)
    }

    /// Derives the current status without treating a missing daemon as an error.
    ///
    /// A missing daemon yields a status with every other field empty.
    pub async fn snapshot(&self) -> ServiceStatus {
        if !self.installed() {
            return ServiceStatus::default();
        }

        let banner = self
            .binary
            .version_banner()
            .await
            .map(|text| parse_version_banner(&text))
            .unwrap_or_default();

        let report = parse_status_report(&self.supervisor.status_report().await);

        ServiceStatus {
            is_installed: true,
            is_running: report.active_state == Some(ActiveState::Active),
            version: banner.version,
            build_date: banner.build_date,
            build_type: banner.build_type,
            platform: banner.platform,
            architecture: banner.architecture,
            service_state: Some(report.service_state()),
            last_error: report.last_error.clone().unwrap_or_default(),
            load_state: report.load_state,
            active_state: report.active_state,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

//! Request and response bodies of the REST API.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::runtime::{CommandOutput, ServiceStatus};

//-------------------------------------------------------------------------------------------------
// Types
//-------------------------------------------------------------------------------------------------

/// Error body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// What went wrong.
    pub error: String,

    /// Raw command output, when the failure came from a host command.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// A plain acknowledgement.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Human readable outcome.
    pub message: String,
}

/// Outcome of an installer run.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// Human readable outcome.
    pub message: String,

    /// Combined installer output.
    pub output: String,
}

/// Body of `GET /api/v1/hysteria/status`.
#[derive(Debug, Serialize)]
pub struct HysteriaStatusResponse {
    /// The derived status.
    #[serde(flatten)]
    pub status: ServiceStatus,

    /// Set when the daemon is not installed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// The daemon configuration text.
#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBody {
    /// The configuration, verbatim.
    pub config: String,
}

/// Backup names, newest first.
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupsResponse {
    /// Backup file names.
    pub backups: Vec<String>,
}

/// Body of `POST /api/v1/hysteria/config/restore`.
#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    /// Name of the backup to restore.
    pub backup: String,
}

/// Query of `GET /api/v1/hysteria/logs`. Values are kept raw and validated leniently.
#[derive(Debug, Default, Deserialize)]
pub struct LogsParams {
    /// Number of trailing lines.
    pub lines: Option<String>,

    /// Relative start, such as `5m` or `2h`.
    pub since: Option<String>,

    /// Minimum priority.
    pub level: Option<String>,
}

/// Journal output.
#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    /// Raw journal text.
    pub logs: String,
}

/// Installable release tags.
#[derive(Debug, Serialize, Deserialize)]
pub struct VersionsResponse {
    /// Release tags as published upstream.
    pub versions: Vec<String>,
}

/// Body of `POST /api/v1/hysteria/versions/install`.
#[derive(Debug, Deserialize)]
pub struct InstallVersionRequest {
    /// Release tag to install.
    pub version: String,
}

/// Body of the IP list replacement endpoints.
#[derive(Debug, Deserialize)]
pub struct IpListRequest {
    /// The complete new list.
    pub ips: Vec<String>,
}

/// Body of the domain whitelist replacement endpoint.
#[derive(Debug, Deserialize)]
pub struct DomainListRequest {
    /// The complete new list.
    pub domains: Vec<String>,
}

/// The IP whitelist.
#[derive(Debug, Serialize, Deserialize)]
pub struct WhitelistResponse {
    /// Whitelisted source IPs.
    pub whitelist: BTreeSet<String>,
}

/// The IP blacklist.
#[derive(Debug, Serialize, Deserialize)]
pub struct BlacklistResponse {
    /// Blacklisted source IPs.
    pub blacklist: BTreeSet<String>,
}

/// The domain whitelist.
#[derive(Debug, Serialize, Deserialize)]
pub struct DomainsResponse {
    /// Whitelisted hostnames and wildcards.
    pub domains: BTreeSet<String>,
}

//-------------------------------------------------------------------------------------------------
// Methods
//-------------------------------------------------------------------------------------------------

impl MessageResponse {
    /// Creates an acknowledgement.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl CommandResponse {
    /// Creates a response from a successful installer run.
    pub fn new(message: impl Into<String>, output: CommandOutput) -> Self {
        Self {
            message: message.into(),
            output: output.output,
        }
    }
}

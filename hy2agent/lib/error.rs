use std::time::Duration;

use thiserror::Error;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The result of a hy2agent-related operation.
pub type AgentResult<T> = Result<T, AgentError>;

/// An error that occurred while managing the daemon or serving the API.
#[derive(Debug, Error)]
pub enum AgentError {
    /// An I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON (de)serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// An error that occurred during an HTTP request.
    #[error("http request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    /// An error that occurred during an HTTP middleware operation.
    #[error("http middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// An error that occurred when a join handle returned an error.
    #[error("join error: {0}")]
    JoinError(#[from] tokio::task::JoinError),

    /// The daemon binary could not be found on the host.
    #[error("hysteria2 is not installed")]
    NotInstalled,

    /// The host could not launch a control command, or the command exited unsuccessfully.
    #[error("failed to {action} service: {detail}")]
    CommandIssue {
        /// The action that was attempted.
        action: String,

        /// Diagnostic output of the failed command.
        detail: String,
    },

    /// The command was issued but the expected state was never observed.
    #[error("failed to {action} service: {reason}")]
    VerificationFailed {
        /// The action that was attempted.
        action: String,

        /// The best available diagnostic.
        reason: String,
    },

    /// The vendor installer exited unsuccessfully.
    #[error("{operation} failed")]
    InstallerFailed {
        /// The installer operation (install, uninstall, upgrade).
        operation: String,

        /// The combined output of the installer.
        output: String,
    },

    /// The operation was cancelled before completing.
    #[error("operation cancelled")]
    Cancelled,

    /// The operation did not finish within its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// A backup name does not follow the backup naming convention.
    #[error("invalid backup file name: {0}")]
    InvalidBackupName(String),

    /// The named backup does not exist.
    #[error("backup file not found: {0}")]
    BackupNotFound(String),

    /// Taking a backup of the live configuration failed.
    #[error("failed to backup config: {0}")]
    BackupFailed(#[source] Box<AgentError>),

    /// The configuration was written but the service failed to pick it up.
    #[error("config written but not applied: {0}")]
    ConfigNotApplied(#[source] Box<AgentError>),

    /// The release feed returned something unexpected.
    #[error("release feed error: {0}")]
    ReleaseFeed(String),

    /// The access policy could not be loaded or initialized.
    #[error("policy error: {0}")]
    Policy(String),

    /// An invalid argument was supplied.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl AgentError {
    /// Returns the raw command output attached to this error, if any.
    pub fn output(&self) -> Option<&str> {
        match self {
            AgentError::InstallerFailed { output, .. } => Some(output),
            AgentError::CommandIssue { detail, .. } if !detail.is_empty() => Some(detail),
            AgentError::ConfigNotApplied(source) => source.output(),
            _ => None,
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

//! Best-effort parsers for supervisor and daemon output.
//!
//! Nothing in here fails. Output in an unexpected shape leaves the corresponding fields empty.

use serde::{Deserialize, Serialize};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Substrings that mark a status report line as an error line.
const ERROR_MARKERS: [&str; 3] = ["FATAL", "ERROR", "Failed"];

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Whether the supervisor has the unit file loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadState {
    /// The unit file is loaded.
    Loaded,

    /// The unit file is missing or could not be loaded.
    NotLoaded,
}

/// The supervisor's activation state of the unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveState {
    /// The unit is active.
    Active,

    /// The unit is not active.
    Inactive,

    /// The unit entered the failed state.
    Failed,
}

/// The lifecycle state of the daemon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// The state could not be determined.
    #[default]
    Unknown,

    /// The daemon is stopped.
    Stopped,

    /// The daemon is running.
    Running,

    /// The daemon failed.
    Failed,
}

/// A classified line of a supervisor status report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLine<'a> {
    /// A `Loaded:` line.
    Loaded(LoadState),

    /// An `Active:` line. `None` for transitional states such as `activating` and for active
    /// units without a running process.
    Active(Option<ActiveState>),

    /// A line carrying an error marker, reduced to its message.
    Error(&'a str),

    /// Anything else.
    Other,
}

/// What could be learned from a supervisor status report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorReport {
    /// The load state, if a `Loaded:` line was seen.
    pub load_state: Option<LoadState>,

    /// The active state, if a recognizable `Active:` line was seen.
    pub active_state: Option<ActiveState>,

    /// The first error line.
    pub last_error: Option<String>,
}

/// Fields of the daemon's `version` output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionBanner {
    /// `Version:`
    pub version: String,

    /// `BuildDate:`
    pub build_date: String,

    /// `BuildType:`
    pub build_type: String,

    /// `Platform:`
    pub platform: String,

    /// `Architecture:`
    pub architecture: String,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl SupervisorReport {
    /// Maps the active state onto the daemon lifecycle.
    pub fn service_state(&self) -> ServiceState {
        match self.active_state {
            Some(ActiveState::Active) => ServiceState::Running,
            Some(ActiveState::Inactive) => ServiceState::Stopped,
            Some(ActiveState::Failed) => ServiceState::Failed,
            None => ServiceState::Unknown,
        }
    }
}

impl ServiceState {
    /// Returns the lowercase name used in messages and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Unknown => "unknown",
            ServiceState::Stopped => "stopped",
            ServiceState::Running => "running",
            ServiceState::Failed => "failed",
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Classifies a single line of `systemctl status` output.
pub fn classify_line(line: &str) -> StatusLine<'_> {
    let line = line.trim();

    if let Some(rest) = field_value(line, "Loaded:") {
        return match first_word(rest) {
            Some("loaded") => StatusLine::Loaded(LoadState::Loaded),
            _ => StatusLine::Loaded(LoadState::NotLoaded),
        };
    }

    if let Some(rest) = field_value(line, "Active:") {
        let mut words = rest.split_whitespace();
        let state = match (words.next(), words.next()) {
            // `active (exited)` and similar sub-states have no running process
            (Some("active"), Some("(running)")) => Some(ActiveState::Active),
            (Some("active"), _) => None,
            (Some("inactive"), _) => Some(ActiveState::Inactive),
            (Some("failed"), _) => Some(ActiveState::Failed),
            _ => None,
        };
        return StatusLine::Active(state);
    }

    if ERROR_MARKERS.iter().any(|marker| line.contains(marker)) {
        return StatusLine::Error(error_message(line));
    }

    StatusLine::Other
}

/// Parses a full `systemctl status` report.
pub fn parse_status_report(text: &str) -> SupervisorReport {
    let mut report = SupervisorReport::default();

    for line in text.lines() {
        match classify_line(line) {
            StatusLine::Loaded(state) => report.load_state = Some(state),
            StatusLine::Active(state) => report.active_state = state,
            StatusLine::Error(message) if report.last_error.is_none() && !message.is_empty() => {
                report.last_error = Some(message.to_string());
            }
            _ => {}
        }
    }

    report
}

/// Parses the output of `hysteria version`.
pub fn parse_version_banner(text: &str) -> VersionBanner {
    let mut banner = VersionBanner::default();

    for line in text.lines().map(str::trim) {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        let value = value.trim().to_string();
        match key.trim() {
            "Version" => banner.version = value,
            "BuildDate" => banner.build_date = value,
            "BuildType" => banner.build_type = value,
            "Platform" => banner.platform = value,
            "Architecture" => banner.architecture = value,
            _ => {}
        }
    }

    banner
}

fn field_value<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    line.strip_prefix(label).map(str::trim)
}

fn first_word(text: &str) -> Option<&str> {
    text.split_whitespace().next()
}

/// Journal lines look like `Jan 01 00:00:00 host hysteria[42]: <message>`; keep the message.
fn error_message(line: &str) -> &str {
    match line.split_once("]: ") {
        Some((_, message)) => message.trim(),
        None => line,
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

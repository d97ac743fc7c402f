use std::{fmt, sync::LazyLock};

use regex::Regex;

use crate::AgentResult;

use super::ServiceSupervisor;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Upper bound on the number of journal lines a single query may ask for.
pub const MAX_LOG_LINES: u32 = 10_000;

/// Relative time tokens: a count followed by `m` (minutes) or `h` (hours).
static SINCE_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)([mh])$").unwrap());

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Journal priority filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// `err`
    Error,

    /// `warning`
    Warning,

    /// `info`
    Info,

    /// `debug`
    Debug,
}

/// A validated journal query. Tokens that fail validation are dropped, not rejected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogQuery {
    lines: Option<u32>,
    since: Option<(u64, char)>,
    level: Option<LogLevel>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl LogLevel {
    /// Parses a level name, case-insensitively. `warn` is accepted for `warning`.
    pub fn parse(level: &str) -> Option<Self> {
        match level.trim().to_ascii_lowercase().as_str() {
            "error" => Some(LogLevel::Error),
            "warning" | "warn" => Some(LogLevel::Warning),
            "info" => Some(LogLevel::Info),
            "debug" => Some(LogLevel::Debug),
            _ => None,
        }
    }

    /// Returns the journalctl priority name.
    pub fn priority(&self) -> &'static str {
        match self {
            LogLevel::Error => "err",
            LogLevel::Warning => "warning",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        }
    }
}

impl LogQuery {
    /// Builds a query from raw request tokens.
    pub fn from_raw(lines: Option<&str>, since: Option<&str>, level: Option<&str>) -> Self {
        let lines = lines
            .and_then(|n| n.trim().parse::<i64>().ok())
            .filter(|n| *n > 0)
            .map(|n| n.min(MAX_LOG_LINES as i64) as u32);

        let since = since.and_then(|token| {
            let captures = SINCE_REGEX.captures(token.trim())?;
            let count = captures[1].parse().ok()?;
            let unit = captures[2].chars().next()?;
            Some((count, unit))
        });

        Self {
            lines,
            since,
            level: level.and_then(LogLevel::parse),
        }
    }

    /// Number of trailing lines requested.
    pub fn lines(&self) -> Option<u32> {
        self.lines
    }

    /// Priority filter.
    pub fn level(&self) -> Option<LogLevel> {
        self.level
    }

    /// Journal filter arguments, to be appended after the unit selection.
    ///
    /// Each element is a separate argv entry; nothing is interpreted by a shell.
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(lines) = self.lines {
            args.push("-n".to_string());
            args.push(lines.to_string());
        }

        if let Some((count, unit)) = self.since {
            let unit = if unit == 'h' { "hours" } else { "min" };
            args.push("--since".to_string());
            args.push(format!("{} {} ago", count, unit));
        }

        if let Some(level) = self.level {
            args.push("-p".to_string());
            args.push(level.priority().to_string());
        }

        args
    }

    /// Renders the full journalctl command line for `unit`, shell-quoted. Diagnostics only.
    pub fn render(&self, unit: &str) -> String {
        ["journalctl", "--no-pager", "-u", unit]
            .into_iter()
            .map(str::to_string)
            .chain(self.args())
            .map(|arg| shell_quote(&arg))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Reads the journal through the supervisor.
    pub async fn fetch(&self, supervisor: &dyn ServiceSupervisor) -> AgentResult<String> {
        tracing::debug!("reading journal: {}", self);
        supervisor.journal(&self.args()).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn shell_quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@".contains(c));

    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl fmt::Display for LogQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.args().join(" "))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

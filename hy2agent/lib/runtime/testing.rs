//! Scripted host capabilities for unit tests.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{AgentError, AgentResult};

use super::{CommandOutput, DaemonBinary, DaemonInstaller, ServiceSupervisor};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const LOADED: &str = "     Loaded: loaded (/etc/systemd/system/hysteria-server.service; enabled)";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// A supervisor that replays canned status reports.
///
/// Each `status_report` call pops the next report; the last one repeats forever.
pub struct FakeSupervisor {
    reports: Mutex<VecDeque<String>>,
    is_active: Mutex<String>,
    failing: HashSet<&'static str>,
    calls: Mutex<Vec<String>>,
    status_calls: AtomicUsize,
}

/// A daemon binary that is either present with a fixed banner or missing.
pub struct FakeBinary {
    banner: Option<String>,
}

/// An installer that records its arguments and returns a fixed outcome.
pub struct FakeInstaller {
    outcome: CommandOutput,
    runs: Mutex<Vec<Vec<String>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl FakeSupervisor {
    /// Replays the given reports in order.
    pub fn with_reports(reports: impl IntoIterator<Item = String>) -> Self {
        Self {
            reports: Mutex::new(reports.into_iter().collect()),
            is_active: Mutex::new("inactive".to_string()),
            failing: HashSet::new(),
            calls: Mutex::new(Vec::new()),
            status_calls: AtomicUsize::new(0),
        }
    }

    /// Always reports an active unit.
    pub fn running() -> Self {
        Self::with_reports([running_report()])
    }

    /// Always reports an inactive unit.
    pub fn stopped() -> Self {
        Self::with_reports([stopped_report()])
    }

    /// Always reports a failed unit with the given journal line.
    pub fn failed(error: &str) -> Self {
        Self::with_reports([failed_report(error)])
    }

    /// Sets what `is_active` returns.
    pub fn is_active_reports(self, state: &str) -> Self {
        *self.is_active.lock().unwrap() = state.to_string();
        self
    }

    /// Makes the given control action fail to launch.
    pub fn failing_on(mut self, action: &'static str) -> Self {
        self.failing.insert(action);
        self
    }

    /// Number of status reports served so far.
    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Control actions issued so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn control(&self, action: &'static str) -> AgentResult<()> {
        self.calls.lock().unwrap().push(action.to_string());

        if self.failing.contains(action) {
            return Err(AgentError::CommandIssue {
                action: action.to_string(),
                detail: "unit not found".to_string(),
            });
        }

        Ok(())
    }
}

impl FakeBinary {
    /// A daemon that prints `banner` for `version`.
    pub fn installed(banner: &str) -> Self {
        Self {
            banner: Some(banner.to_string()),
        }
    }

    /// No daemon on the host.
    pub fn missing() -> Self {
        Self { banner: None }
    }
}

impl FakeInstaller {
    /// An installer that finishes with the given outcome.
    pub fn new(success: bool, output: &str) -> Self {
        Self {
            outcome: CommandOutput {
                success,
                output: output.to_string(),
            },
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Argument lists of every run so far.
    pub fn runs(&self) -> Vec<Vec<String>> {
        self.runs.lock().unwrap().clone()
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ServiceSupervisor for FakeSupervisor {
    async fn status_report(&self) -> String {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let mut reports = self.reports.lock().unwrap();
        if reports.len() > 1 {
            reports.pop_front().unwrap_or_default()
        } else {
            reports.front().cloned().unwrap_or_default()
        }
    }

    async fn is_active(&self) -> String {
        self.is_active.lock().unwrap().clone()
    }

    async fn start(&self) -> AgentResult<()> {
        self.control("start")
    }

    async fn stop(&self) -> AgentResult<()> {
        self.control("stop")
    }

    async fn restart(&self) -> AgentResult<()> {
        self.control("restart")
    }

    async fn enable(&self) -> AgentResult<()> {
        self.control("enable")
    }

    async fn journal(&self, args: &[String]) -> AgentResult<String> {
        Ok(args.join(" "))
    }
}

#[async_trait]
impl DaemonBinary for FakeBinary {
    fn is_installed(&self) -> bool {
        self.banner.is_some()
    }

    async fn version_banner(&self) -> Option<String> {
        self.banner.clone()
    }
}

#[async_trait]
impl DaemonInstaller for FakeInstaller {
    async fn run(&self, args: &[String]) -> AgentResult<CommandOutput> {
        self.runs.lock().unwrap().push(args.to_vec());
        Ok(self.outcome.clone())
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// A status report of an active unit.
pub fn running_report() -> String {
    format!("{LOADED}\n     Active: active (running) since Mon 2024-01-01 00:00:00 UTC")
}

/// A status report of an inactive unit.
pub fn stopped_report() -> String {
    format!("{LOADED}\n     Active: inactive (dead)")
}

/// A status report of a failed unit.
pub fn failed_report(error: &str) -> String {
    format!(
        "{LOADED}\n     Active: failed (Result: exit-code)\n\nJan 01 00:00:00 host hysteria[7]: {error}"
    )
}

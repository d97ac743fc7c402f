//! Capabilities of the host that the agent drives.
//!
//! The agent never talks to systemd or the daemon binary directly. It goes through the traits in
//! this module so tests can substitute a scripted host.

use std::process::{Output, Stdio};

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tokio::{io::AsyncWriteExt, process::Command};

use crate::{AgentError, AgentResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Combined output of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommandOutput {
    /// Whether the command exited successfully.
    pub success: bool,

    /// Interleaved stdout and stderr.
    pub output: String,
}

/// The host service supervisor, systemd on every supported system.
#[derive(Debug, Clone)]
pub struct Systemd {
    unit: String,
}

/// The daemon executable.
#[derive(Debug, Clone)]
pub struct HysteriaBinary {
    binary: String,
}

/// Runs the vendor's install script.
///
/// The script is downloaded with reqwest and piped into `bash -s`, so arguments never pass
/// through a shell command line.
#[derive(Debug, Clone)]
pub struct ScriptInstaller {
    client: Client,
    script_url: String,
}

//--------------------------------------------------------------------------------------------------
// Traits
//--------------------------------------------------------------------------------------------------

/// Start/stop/status operations on the daemon's service unit.
#[async_trait]
pub trait ServiceSupervisor: Send + Sync {
    /// Returns the human-readable status report of the unit. Never fails; an unreadable report
    /// is returned as an empty string.
    async fn status_report(&self) -> String;

    /// Returns the single-word active state (`active`, `inactive`, `failed`, ...).
    async fn is_active(&self) -> String;

    /// Starts the unit.
    async fn start(&self) -> AgentResult<()>;

    /// Stops the unit.
    async fn stop(&self) -> AgentResult<()>;

    /// Restarts the unit.
    async fn restart(&self) -> AgentResult<()>;

    /// Enables the unit at boot.
    async fn enable(&self) -> AgentResult<()>;

    /// Reads the unit's journal with the given extra arguments.
    async fn journal(&self, args: &[String]) -> AgentResult<String>;
}

/// Queries against the daemon executable.
#[async_trait]
pub trait DaemonBinary: Send + Sync {
    /// Returns true if the executable can be resolved on `PATH`.
    fn is_installed(&self) -> bool;

    /// Returns the output of the daemon's `version` command, if it ran.
    async fn version_banner(&self) -> Option<String>;
}

/// The vendor install/uninstall/upgrade entry point.
#[async_trait]
pub trait DaemonInstaller: Send + Sync {
    /// Runs the installer with the given arguments.
    ///
    /// Returns `Err` only when the installer could not be launched; a failing run is reported
    /// through [`CommandOutput::success`].
    async fn run(&self, args: &[String]) -> AgentResult<CommandOutput>;
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl Systemd {
    /// Creates a supervisor for the given unit.
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    /// Runs `systemctl <action> <unit>` and fails if it cannot be launched or exits non-zero.
    async fn control(&self, action: &str) -> AgentResult<()> {
        tracing::debug!("systemctl {} {}", action, self.unit);

        let output = Command::new("systemctl")
            .args([action, self.unit.as_str()])
            .output()
            .await
            .map_err(|e| AgentError::CommandIssue {
                action: action.to_string(),
                detail: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(AgentError::CommandIssue {
                action: action.to_string(),
                detail: combined_output(&output).trim().to_string(),
            });
        }

        Ok(())
    }
}

impl HysteriaBinary {
    /// Creates a handle on the given executable name or path.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl ScriptInstaller {
    /// Creates an installer that fetches the script from `script_url`.
    pub fn new(script_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            script_url: script_url.into(),
        }
    }

    async fn fetch_script(&self) -> AgentResult<Vec<u8>> {
        let response = self
            .client
            .get(&self.script_url)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ServiceSupervisor for Systemd {
    async fn status_report(&self) -> String {
        // `systemctl status` exits non-zero for inactive units; the report is still useful.
        match Command::new("systemctl")
            .args(["status", "--no-pager", self.unit.as_str()])
            .output()
            .await
        {
            Ok(output) => combined_output(&output),
            Err(e) => {
                tracing::warn!("failed to run systemctl status: {}", e);
                String::new()
            }
        }
    }

    async fn is_active(&self) -> String {
        match Command::new("systemctl")
            .args(["is-active", self.unit.as_str()])
            .output()
            .await
        {
            Ok(output) => String::from_utf8_lossy(&output.stdout).trim().to_string(),
            Err(e) => {
                tracing::warn!("failed to run systemctl is-active: {}", e);
                "unknown".to_string()
            }
        }
    }

    async fn start(&self) -> AgentResult<()> {
        self.control("start").await
    }

    async fn stop(&self) -> AgentResult<()> {
        self.control("stop").await
    }

    async fn restart(&self) -> AgentResult<()> {
        self.control("restart").await
    }

    async fn enable(&self) -> AgentResult<()> {
        self.control("enable").await
    }

    async fn journal(&self, args: &[String]) -> AgentResult<String> {
        let output = Command::new("journalctl")
            .args(["--no-pager", "-u", self.unit.as_str()])
            .args(args)
            .output()
            .await
            .map_err(|e| AgentError::CommandIssue {
                action: "read logs of".to_string(),
                detail: e.to_string(),
            })?;

        let text = combined_output(&output);
        if !output.status.success() {
            return Err(AgentError::CommandIssue {
                action: "read logs of".to_string(),
                detail: text,
            });
        }

        Ok(text)
    }
}

#[async_trait]
impl DaemonBinary for HysteriaBinary {
    fn is_installed(&self) -> bool {
        which::which(&self.binary).is_ok()
    }

    async fn version_banner(&self) -> Option<String> {
        let output = Command::new(&self.binary)
            .arg("version")
            .output()
            .await
            .ok()?;

        if !output.status.success() {
            return None;
        }

        Some(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl DaemonInstaller for ScriptInstaller {
    async fn run(&self, args: &[String]) -> AgentResult<CommandOutput> {
        let script = self.fetch_script().await?;
        tracing::info!("running installer from {} with {:?}", self.script_url, args);

        run_script(script, args).await
    }
}

//--------------------------------------------------------------------------------------------------
// Functions: Helpers
//--------------------------------------------------------------------------------------------------

/// Pipes `script` into `bash -s -- <args>` and collects its output.
///
/// Stdin is fed from a separate task so a script that exits before reading all of its input
/// still reports its output.
async fn run_script(script: Vec<u8>, args: &[String]) -> AgentResult<CommandOutput> {
    let mut child = Command::new("bash")
        .arg("-s")
        .arg("--")
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AgentError::CommandIssue {
            action: "run installer for".to_string(),
            detail: e.to_string(),
        })?;

    let feeder = child.stdin.take().map(|mut stdin| {
        tokio::spawn(async move {
            // Dropping stdin at the end closes the pipe so bash sees EOF
            if let Err(e) = stdin.write_all(&script).await {
                tracing::debug!("installer stopped reading its script: {}", e);
            }
        })
    });

    let output = child.wait_with_output().await?;
    if let Some(feeder) = feeder {
        feeder.await?;
    }

    Ok(CommandOutput {
        success: output.status.success(),
        output: combined_output(&output),
    })
}

fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);

    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&stderr);
    }

    text
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

//! Composite health check of the daemon.

use std::path::Path;

use chrono::Utc;
use serde::Serialize;
use tokio::fs;

use super::ServiceProbe;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Kernel socket tables consulted for the port check, with whether they are TCP tables.
const PROC_NET_TABLES: [(&str, bool); 4] = [
    ("/proc/net/udp", false),
    ("/proc/net/udp6", false),
    ("/proc/net/tcp", true),
    ("/proc/net/tcp6", true),
];

/// `st` column value of a listening TCP socket.
const TCP_LISTEN_STATE: &str = "0A";

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Result of a health check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// Whether the supervisor reports the daemon as running.
    pub is_running: bool,

    /// Whether the configured listen port is bound. `false` when no port could be extracted.
    pub port_open: bool,

    /// Whether the configuration file could be read.
    pub config_valid: bool,

    /// The first error line from the status report.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_error: String,

    /// RFC 3339 time of the check.
    pub check_time: String,
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Runs the health check. Never fails; each part degrades to `false`.
pub async fn check_health(probe: &ServiceProbe, config_path: &Path) -> HealthReport {
    let status = probe.snapshot().await;

    let config = fs::read_to_string(config_path).await.ok();
    let port = config.as_deref().and_then(extract_listen_port);

    let port_open = match port {
        Some(port) => is_port_bound(port).await,
        None => {
            tracing::debug!("no listen port found in config, skipping port check");
            false
        }
    };

    HealthReport {
        is_running: status.is_running,
        port_open,
        config_valid: config.is_some(),
        last_error: status.last_error,
        check_time: Utc::now().to_rfc3339(),
    }
}

/// Extracts the port of the top-level `listen:` directive.
///
/// Accepts `:443`, `0.0.0.0:443`, `[::]:443`, optionally quoted, with trailing comments.
pub fn extract_listen_port(config: &str) -> Option<u16> {
    config.lines().find_map(|line| {
        let value = line.strip_prefix("listen:")?;
        let value = value.split('#').next()?.trim();
        let value = value.trim_matches(|c| c == '"' || c == '\'');

        let (_, port) = value.rsplit_once(':')?;
        port.parse().ok()
    })
}

/// Returns true if any UDP or listening TCP socket is bound to `port`.
pub async fn is_port_bound(port: u16) -> bool {
    for (path, tcp) in PROC_NET_TABLES {
        match fs::read_to_string(path).await {
            Ok(table) if bound_ports(&table, tcp).any(|p| p == port) => return true,
            Ok(_) => {}
            Err(e) => tracing::debug!("failed to read {}: {}", path, e),
        }
    }

    false
}

/// Yields the local ports of a `/proc/net/{tcp,udp}[6]` table.
///
/// For TCP tables only sockets in the listening state are considered.
pub fn bound_ports(table: &str, tcp: bool) -> impl Iterator<Item = u16> + '_ {
    table.lines().skip(1).filter_map(move |line| {
        let mut columns = line.split_whitespace();
        let local = columns.nth(1)?;
        let state = columns.nth(1)?;

        if tcp && state != TCP_LISTEN_STATE {
            return None;
        }

        let (_, port) = local.rsplit_once(':')?;
        u16::from_str_radix(port, 16).ok()
    })
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

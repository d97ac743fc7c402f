//! Host statistics reported next to the daemon status.
//!
//! All figures come from `sysinfo`. Rates (CPU usage, network speed) need two samples, so the
//! calls that report them take about a second.

use std::{
    net::IpAddr,
    time::{Duration, Instant},
};

use serde::Serialize;
use sysinfo::{Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use tokio::task;

use crate::AgentResult;

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Window over which network throughput is sampled.
const NETWORK_SAMPLE_WINDOW: Duration = Duration::from_secs(1);

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Memory figures in bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MemoryInfo {
    /// Physical memory.
    pub total: u64,

    /// Memory in use.
    pub used: u64,

    /// Unused memory.
    pub free: u64,

    /// Reclaimable memory: available minus free.
    pub cache: u64,
}

/// Usage of one mounted filesystem.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskInfo {
    /// Mount point.
    pub path: String,

    /// Capacity.
    pub total: u64,

    /// Space in use.
    pub used: u64,

    /// Space available.
    pub free: u64,

    /// Used space in percent.
    pub usage_rate: f64,
}

/// Aggregate throughput over all non-loopback interfaces.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInfo {
    /// Bytes sent during the sample window.
    pub upload_speed: u64,

    /// Bytes received during the sample window.
    pub download_speed: u64,

    /// Bytes sent since boot.
    pub total_upload: u64,

    /// Bytes received since boot.
    pub total_download: u64,
}

/// Host identity and uptime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemInfo {
    /// Non-loopback IPv4 addresses.
    pub ipv4: Vec<String>,

    /// Non-loopback IPv6 addresses.
    pub ipv6: Vec<String>,

    /// OS name and version.
    pub os: String,

    /// Host uptime in seconds.
    pub uptime: u64,

    /// Agent uptime in seconds.
    pub online_time: u64,
}

/// CPU usage in percent and load averages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuInfo {
    /// Overall usage.
    pub usage: f64,

    /// Usage per core.
    pub core_usages: Vec<f64>,

    /// One minute load average.
    pub load_avg1: f64,

    /// Five minute load average.
    pub load_avg5: f64,

    /// Fifteen minute load average.
    pub load_avg15: f64,
}

/// Everything at once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SystemStatus {
    /// CPU figures.
    pub cpu: CpuInfo,

    /// Memory figures.
    pub memory: MemoryInfo,

    /// Per-filesystem usage.
    pub disk: Vec<DiskInfo>,

    /// Network figures.
    pub network: NetworkInfo,

    /// Host identity.
    pub system: SystemInfo,
}

/// Collects host statistics.
#[derive(Debug, Clone)]
pub struct StatsCollector {
    started_at: Instant,
}

#[derive(Debug, Clone, Copy, Default)]
struct Traffic {
    sent: u64,
    received: u64,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl StatsCollector {
    /// Creates a collector. Agent uptime counts from here.
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
        }
    }

    /// Memory usage.
    pub async fn memory(&self) -> AgentResult<MemoryInfo> {
        Ok(task::spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_memory();

            MemoryInfo {
                total: sys.total_memory(),
                used: sys.used_memory(),
                free: sys.free_memory(),
                cache: sys.available_memory().saturating_sub(sys.free_memory()),
            }
        })
        .await?)
    }

    /// Usage of every mounted filesystem.
    pub async fn disks(&self) -> AgentResult<Vec<DiskInfo>> {
        Ok(task::spawn_blocking(|| {
            Disks::new_with_refreshed_list()
                .list()
                .iter()
                .map(|disk| {
                    let total = disk.total_space();
                    let free = disk.available_space();
                    let used = total.saturating_sub(free);

                    DiskInfo {
                        path: disk.mount_point().to_string_lossy().into_owned(),
                        total,
                        used,
                        free,
                        usage_rate: percent(used, total),
                    }
                })
                .collect()
        })
        .await?)
    }

    /// Network totals and throughput over a one second window.
    pub async fn network(&self) -> AgentResult<NetworkInfo> {
        let before = task::spawn_blocking(|| traffic(&Networks::new_with_refreshed_list())).await?;
        tokio::time::sleep(NETWORK_SAMPLE_WINDOW).await;
        let after = task::spawn_blocking(|| traffic(&Networks::new_with_refreshed_list())).await?;

        Ok(NetworkInfo {
            upload_speed: after.sent.saturating_sub(before.sent),
            download_speed: after.received.saturating_sub(before.received),
            total_upload: after.sent,
            total_download: after.received,
        })
    }

    /// OS, uptime and the host's non-loopback addresses.
    pub async fn system_info(&self) -> AgentResult<SystemInfo> {
        let online_time = self.started_at.elapsed().as_secs();

        Ok(task::spawn_blocking(move || {
            let mut ipv4 = Vec::new();
            let mut ipv6 = Vec::new();

            let networks = Networks::new_with_refreshed_list();
            for (_, data) in networks.list() {
                for network in data.ip_networks() {
                    match network.addr {
                        addr if addr.is_loopback() => {}
                        IpAddr::V4(addr) => ipv4.push(addr.to_string()),
                        IpAddr::V6(addr) => ipv6.push(addr.to_string()),
                    }
                }
            }

            ipv4.sort();
            ipv4.dedup();
            ipv6.sort();
            ipv6.dedup();

            SystemInfo {
                ipv4,
                ipv6,
                os: System::long_os_version().unwrap_or_default(),
                uptime: System::uptime(),
                online_time,
            }
        })
        .await?)
    }

    /// CPU usage and load averages.
    pub async fn cpu(&self) -> AgentResult<CpuInfo> {
        let mut sys = task::spawn_blocking(|| {
            let mut sys = System::new();
            sys.refresh_cpu_usage();
            sys
        })
        .await?;

        tokio::time::sleep(MINIMUM_CPU_UPDATE_INTERVAL).await;

        Ok(task::spawn_blocking(move || {
            sys.refresh_cpu_usage();
            let load = System::load_average();

            CpuInfo {
                usage: sys.global_cpu_usage() as f64,
                core_usages: sys.cpus().iter().map(|c| c.cpu_usage() as f64).collect(),
                load_avg1: load.one,
                load_avg5: load.five,
                load_avg15: load.fifteen,
            }
        })
        .await?)
    }

    /// A complete snapshot. The sampled parts run concurrently.
    pub async fn status(&self) -> AgentResult<SystemStatus> {
        let (cpu, memory, disk, network, system) = tokio::try_join!(
            self.cpu(),
            self.memory(),
            self.disks(),
            self.network(),
            self.system_info()
        )?;

        Ok(SystemStatus {
            cpu,
            memory,
            disk,
            network,
            system,
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

fn traffic(networks: &Networks) -> Traffic {
    networks
        .list()
        .iter()
        .filter(|(name, _)| name.as_str() != "lo")
        .fold(Traffic::default(), |acc, (_, data)| Traffic {
            sent: acc.sent + data.total_transmitted(),
            received: acc.received + data.total_received(),
        })
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }

    part as f64 / total as f64 * 100.0
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

use std::{path::PathBuf, sync::LazyLock, time::Duration};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Default port for the HTTP server.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default address the HTTP server binds to.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// The systemd unit of the managed daemon.
pub const DEFAULT_SERVICE_UNIT: &str = "hysteria-server.service";

/// The daemon executable looked up on `PATH`.
pub const DEFAULT_DAEMON_BINARY: &str = "hysteria";

/// The vendor installer script.
pub const DEFAULT_INSTALL_SCRIPT_URL: &str = "https://get.hy2.sh/";

/// The upstream release listing.
pub const DEFAULT_RELEASES_URL: &str = "https://api.github.com/repos/apernet/hysteria/releases";

/// The number of configuration backups kept around.
pub const DEFAULT_MAX_BACKUPS: usize = 5;

/// How many times the service state is polled after a start or restart.
pub const DEFAULT_VERIFY_ATTEMPTS: u32 = 3;

/// Delay before each service state poll.
pub const DEFAULT_VERIFY_DELAY: Duration = Duration::from_secs(1);

/// How long the cached release list stays fresh.
pub const DEFAULT_VERSIONS_CACHE_TTL: Duration = Duration::from_secs(60 * 60);

/// Upper bound on a single slow-path request (start, stop, install, ...).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// The directory where the agent keeps its policy and caches.
pub static DEFAULT_AGENT_HOME: LazyLock<PathBuf> = LazyLock::new(|| PathBuf::from("/etc/hy2agent"));

/// The daemon's configuration file.
pub static DEFAULT_HYSTERIA_CONFIG_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from("/etc/hysteria/config.yaml"));

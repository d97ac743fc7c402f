//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// The file that holds the access policy and API key inside the agent home.
pub const POLICY_FILENAME: &str = "config.json";

/// The file that caches the upstream release list inside the agent home.
pub const VERSIONS_CACHE_FILENAME: &str = "versions_cache.json";

/// The infix that separates the config file name from the backup timestamp.
pub const BACKUP_INFIX: &str = ".bak.";

/// The `strftime` format of backup timestamps (second granularity).
pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// The number of digits in a backup timestamp.
pub const BACKUP_TIMESTAMP_LEN: usize = 14;

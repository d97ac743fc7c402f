//! Timestamped copies of the daemon configuration.
//!
//! Backups are named `<config file name>.bak.<YYYYMMDDHHMMSS>`, so ordering names
//! lexicographically orders them chronologically. Backups are never modified after they are
//! written; the oldest are pruned as soon as the retention limit is exceeded.

use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDateTime};
use tokio::fs;

use crate::{
    utils::{BACKUP_INFIX, BACKUP_TIMESTAMP_FORMAT, BACKUP_TIMESTAMP_LEN},
    AgentError, AgentResult,
};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// The set of backups of one configuration file.
#[derive(Debug, Clone)]
pub struct BackupStore {
    config_path: PathBuf,
    dir: PathBuf,
    prefix: String,
    max_backups: usize,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl BackupStore {
    /// Creates a store for `config_path` keeping at most `max_backups` backups in `dir`.
    pub fn new(config_path: impl Into<PathBuf>, dir: impl Into<PathBuf>, max_backups: usize) -> Self {
        let config_path = config_path.into();
        let file_name = config_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.yaml".to_string());

        Self {
            config_path,
            dir: dir.into(),
            prefix: format!("{}{}", file_name, BACKUP_INFIX),
            max_backups,
        }
    }

    /// The live configuration file being backed up.
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// The name prefix shared by every backup, e.g. `config.yaml.bak.`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Backs up the live configuration now. Returns the backup's path.
    pub async fn create(&self) -> AgentResult<PathBuf> {
        self.create_at(Local::now().naive_local()).await
    }

    /// Backs up the live configuration under the given timestamp.
    ///
    /// A backup taken within the same second as an existing one replaces it.
    pub async fn create_at(&self, timestamp: NaiveDateTime) -> AgentResult<PathBuf> {
        let contents = fs::read(&self.config_path).await?;

        let name = format!("{}{}", self.prefix, timestamp.format(BACKUP_TIMESTAMP_FORMAT));
        let path = self.dir.join(&name);
        fs::write(&path, contents).await?;

        tracing::info!("backed up config to {}", path.display());
        self.prune().await;

        Ok(path)
    }

    /// Lists backup names, newest first.
    pub async fn list(&self) -> AgentResult<Vec<String>> {
        let mut names = Vec::new();

        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(names),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.is_backup_name(&name) {
                names.push(name);
            }
        }

        names.sort_unstable_by(|a, b| b.cmp(a));
        Ok(names)
    }

    /// Checks that `name` is a backup name of this store and returns its path.
    pub fn validate_name(&self, name: &str) -> AgentResult<PathBuf> {
        if !self.is_backup_name(name) {
            return Err(AgentError::InvalidBackupName(name.to_string()));
        }

        Ok(self.dir.join(name))
    }

    /// Reads the contents of the named backup.
    pub async fn read(&self, name: &str) -> AgentResult<Vec<u8>> {
        let path = self.validate_name(name)?;

        match fs::read(&path).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(AgentError::BackupNotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn is_backup_name(&self, name: &str) -> bool {
        name.strip_prefix(&self.prefix).is_some_and(|timestamp| {
            timestamp.len() == BACKUP_TIMESTAMP_LEN
                && timestamp.bytes().all(|b| b.is_ascii_digit())
        })
    }

    /// Removes everything past the retention limit. Failures are logged and otherwise ignored.
    async fn prune(&self) {
        let names = match self.list().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!("failed to list backups for pruning: {}", e);
                return;
            }
        };

        for name in names.iter().skip(self.max_backups) {
            let path = self.dir.join(name);
            match fs::remove_file(&path).await {
                Ok(()) => tracing::debug!("pruned backup {}", name),
                Err(e) => tracing::warn!("failed to prune backup {}: {}", path.display(), e),
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

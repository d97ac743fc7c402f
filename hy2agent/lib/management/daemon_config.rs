use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::fs;
use tokio_util::sync::CancellationToken;

use crate::{
    runtime::{LifecycleController, TransitionGuard},
    AgentError, AgentResult,
};

use super::BackupStore;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Reads and replaces the daemon's configuration file.
///
/// Every replacement is preceded by a backup and followed by a verified restart. Mutations hold
/// the daemon's lifecycle lock from backup to restart, so they never interleave with each other
/// or with a start, stop or restart.
pub struct ConfigManager {
    path: PathBuf,
    backups: BackupStore,
    lifecycle: Arc<LifecycleController>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl ConfigManager {
    /// Creates a manager for the config file tracked by `backups`.
    pub fn new(backups: BackupStore, lifecycle: Arc<LifecycleController>) -> Self {
        Self {
            path: backups.config_path().to_path_buf(),
            backups,
            lifecycle,
        }
    }

    /// The live configuration file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration text verbatim.
    pub async fn get(&self) -> AgentResult<String> {
        Ok(fs::read_to_string(&self.path).await?)
    }

    /// Replaces the configuration and restarts the daemon.
    ///
    /// If the backup fails, the live file is left untouched. If the restart fails after the
    /// write, the new file stays in place and [`AgentError::ConfigNotApplied`] is returned.
    pub async fn update(&self, text: &str, cancel: &CancellationToken) -> AgentResult<()> {
        let guard = self.lifecycle.lock(cancel).await?;

        self.backups
            .create()
            .await
            .map_err(|e| AgentError::BackupFailed(Box::new(e)))?;

        fs::write(&self.path, text).await?;
        tracing::info!("wrote new config to {}", self.path.display());

        self.apply(&guard, cancel).await
    }

    /// Lists backup names, newest first.
    pub async fn list_backups(&self) -> AgentResult<Vec<String>> {
        self.backups.list().await
    }

    /// Overwrites the configuration with the named backup and restarts the daemon.
    pub async fn restore(&self, name: &str, cancel: &CancellationToken) -> AgentResult<()> {
        let guard = self.lifecycle.lock(cancel).await?;

        let contents = self.backups.read(name).await?;
        fs::write(&self.path, contents).await?;
        tracing::info!("restored config from {}", name);

        self.apply(&guard, cancel).await
    }

    async fn apply(
        &self,
        guard: &TransitionGuard<'_>,
        cancel: &CancellationToken,
    ) -> AgentResult<()> {
        self.lifecycle.restart_locked(guard, cancel).await.map_err(|e| {
            tracing::error!("config written but restart failed: {}", e);
            AgentError::ConfigNotApplied(Box::new(e))
        })
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::TempDir;

    use super::*;
    use crate::runtime::{
        testing::{FakeBinary, FakeInstaller, FakeSupervisor},
        ServiceProbe, VerifyPolicy,
    };

    const ORIGINAL: &str = "listen: :443\n";

    async fn manager(
        dir: &TempDir,
        supervisor: FakeSupervisor,
        backup_dir: PathBuf,
    ) -> anyhow::Result<(ConfigManager, Arc<FakeSupervisor>)> {
        let config_path = dir.path().join("config.yaml");
        fs::write(&config_path, ORIGINAL).await?;

        let supervisor = Arc::new(supervisor);
        let probe = ServiceProbe::new(supervisor.clone(), Arc::new(FakeBinary::installed("")));
        let lifecycle = LifecycleController::new(
            supervisor.clone(),
            Arc::new(FakeInstaller::new(true, "")),
            probe,
            VerifyPolicy {
                attempts: 2,
                delay: Duration::from_millis(1),
            },
        );

        let backups = BackupStore::new(config_path, backup_dir, 5);
        Ok((ConfigManager::new(backups, Arc::new(lifecycle)), supervisor))
    }

    #[test_log::test(tokio::test)]
    async fn test_update_backs_up_writes_and_restarts() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (manager, supervisor) =
            manager(&dir, FakeSupervisor::running(), dir.path().to_path_buf()).await?;

        manager
            .update("listen: :8443\n", &CancellationToken::new())
            .await?;

        assert_eq!(manager.get().await?, "listen: :8443\n");
        assert_eq!(supervisor.calls(), vec!["restart"]);

        let backups = manager.list_backups().await?;
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(dir.path().join(&backups[0])).await?,
            ORIGINAL
        );

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_backup_failure_leaves_config_untouched() -> anyhow::Result<()> {
        let dir = TempDir::new()?;

        // A regular file where the backup directory should be
        let not_a_dir = dir.path().join("backups");
        fs::write(&not_a_dir, "").await?;

        let (manager, supervisor) = manager(&dir, FakeSupervisor::running(), not_a_dir).await?;

        let result = manager
            .update("listen: :8443\n", &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(AgentError::BackupFailed(_))));
        assert_eq!(manager.get().await?, ORIGINAL);
        assert!(supervisor.calls().is_empty());

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_restart_failure_is_not_applied() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (manager, _) = manager(
            &dir,
            FakeSupervisor::failed("FATAL invalid config"),
            dir.path().to_path_buf(),
        )
        .await?;

        let err = manager
            .update("listen: nope\n", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::ConfigNotApplied(_)));
        assert_eq!(
            err.to_string(),
            "config written but not applied: failed to restart service: FATAL invalid config"
        );
        assert_eq!(manager.get().await?, "listen: nope\n");

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_update_waits_for_lifecycle_transition() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (manager, supervisor) =
            manager(&dir, FakeSupervisor::running(), dir.path().to_path_buf()).await?;
        let manager = Arc::new(manager);

        let guard = manager.lifecycle.lock(&CancellationToken::new()).await?;
        let update = tokio::spawn({
            let manager = manager.clone();
            async move {
                manager
                    .update("listen: :8443\n", &CancellationToken::new())
                    .await
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!update.is_finished());
        assert_eq!(manager.get().await?, ORIGINAL);
        assert!(manager.list_backups().await?.is_empty());

        drop(guard);
        update.await??;
        assert_eq!(manager.get().await?, "listen: :8443\n");
        assert_eq!(supervisor.calls(), vec!["restart"]);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_restore() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (manager, supervisor) =
            manager(&dir, FakeSupervisor::running(), dir.path().to_path_buf()).await?;
        let cancel = CancellationToken::new();

        manager.update("listen: :8443\n", &cancel).await?;
        let backup = manager.list_backups().await?.remove(0);

        manager.restore(&backup, &cancel).await?;
        assert_eq!(manager.get().await?, ORIGINAL);
        assert_eq!(supervisor.calls(), vec!["restart", "restart"]);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_restore_rejects_bad_names() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let (manager, supervisor) =
            manager(&dir, FakeSupervisor::running(), dir.path().to_path_buf()).await?;
        let cancel = CancellationToken::new();

        assert!(matches!(
            manager.restore("../../etc/passwd", &cancel).await,
            Err(AgentError::InvalidBackupName(_))
        ));
        assert!(matches!(
            manager.restore("config.yaml.bak.20000101000000", &cancel).await,
            Err(AgentError::BackupNotFound(_))
        ));

        assert_eq!(manager.get().await?, ORIGINAL);
        assert!(supervisor.calls().is_empty());

        Ok(())
    }
}

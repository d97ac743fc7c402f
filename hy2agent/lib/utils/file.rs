use std::{io::Write, path::Path};

use tempfile::NamedTempFile;

use crate::{AgentError, AgentResult};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Writes `contents` to `path` by writing a sibling temporary file and renaming it into place.
///
/// Readers observe either the old contents or the new contents, never a truncated file. The
/// temporary file is created with owner-only permissions, and so is the final file.
pub async fn write_atomic(path: impl AsRef<Path>, contents: impl Into<Vec<u8>>) -> AgentResult<()> {
    let path = path.as_ref().to_path_buf();
    let contents = contents.into();

    tokio::task::spawn_blocking(move || write_atomic_blocking(&path, &contents)).await?
}

fn write_atomic_blocking(path: &Path, contents: &[u8]) -> AgentResult<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let mut temp = NamedTempFile::new_in(parent)?;
    temp.write_all(contents)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| AgentError::Io(e.error))?;

    Ok(())
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test_log::test(tokio::test)]
    async fn test_write_atomic_replaces_contents() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("policy.json");

        write_atomic(&path, "first").await?;
        assert_eq!(tokio::fs::read_to_string(&path).await?, "first");

        write_atomic(&path, "second").await?;
        assert_eq!(tokio::fs::read_to_string(&path).await?, "second");

        // No temporary files are left behind
        let entries = std::fs::read_dir(dir.path())?.count();
        assert_eq!(entries, 1);

        Ok(())
    }

    #[test_log::test(tokio::test)]
    async fn test_write_atomic_fails_for_missing_parent() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("missing").join("policy.json");

        assert!(write_atomic(&path, "data").await.is_err());

        Ok(())
    }
}

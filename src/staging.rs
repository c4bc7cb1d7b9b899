//! Per-attempt staging directories
//!
//! Every generation attempt writes into its own uniquely named directory,
//! which is removed when the attempt ends: on success, on error, on panic and
//! when the attempt's future is dropped. The process working directory is
//! never changed; generators receive the staging path explicitly.

use futures_util::FutureExt;
use std::future::Future;
use std::io;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};

/// Prefix of every staging directory name
pub const STAGING_PREFIX: &str = "stencil-stage-";

/// Create a staging directory under `root`, run `body` with its path and
/// remove the directory afterwards.
///
/// Removal failures are logged and never replace the body's result. A panic
/// in `body` resumes after the directory is gone.
pub async fn with_staging_dir<T, F, Fut>(root: &Path, body: F) -> io::Result<T>
where
    F: FnOnce(PathBuf) -> Fut,
    Fut: Future<Output = T>,
{
    tokio::fs::create_dir_all(root).await?;
    let dir = tempfile::Builder::new()
        .prefix(STAGING_PREFIX)
        .tempdir_in(root)?;
    let path = dir.path().to_path_buf();
    debug!("Created staging directory {}", path.display());

    // If this future is dropped mid-body, `dir`'s Drop removes the directory.
    let outcome = AssertUnwindSafe(body(path)).catch_unwind().await;

    remove(dir).await;

    match outcome {
        Ok(value) => Ok(value),
        Err(panic) => std::panic::resume_unwind(panic),
    }
}

async fn remove(dir: TempDir) {
    let path = dir.path().to_path_buf();
    let result = tokio::task::spawn_blocking(move || dir.close()).await;
    match result {
        Ok(Ok(())) => debug!("Removed staging directory {}", path.display()),
        Ok(Err(e)) => warn!("Failed to remove staging directory {}: {}", path.display(), e),
        Err(e) => warn!("Staging cleanup task for {} failed: {}", path.display(), e),
    }
}

/// Staging directories currently present under `root`
pub fn list_staging_dirs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    if !root.exists() {
        return Ok(dirs);
    }
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        let is_staging = entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.starts_with(STAGING_PREFIX));
        if is_staging && entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn directory_exists_during_body_and_is_removed_after() {
        let root = tempfile::TempDir::new().unwrap();

        let seen = with_staging_dir(root.path(), |dir| async move {
            assert!(dir.is_dir());
            std::fs::write(dir.join("Cargo.toml"), "[package]").unwrap();
            std::fs::create_dir_all(dir.join("src/bin")).unwrap();
            dir
        })
        .await
        .unwrap();

        assert!(seen.starts_with(root.path()));
        assert!(!seen.exists());
        assert!(list_staging_dirs(root.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_when_body_fails() {
        let root = tempfile::TempDir::new().unwrap();

        let result: Result<(), String> = with_staging_dir(root.path(), |dir| async move {
            std::fs::write(dir.join("partial.txt"), "x").unwrap();
            Err("generator failed".to_string())
        })
        .await
        .unwrap();

        assert_eq!(result, Err("generator failed".to_string()));
        assert!(list_staging_dirs(root.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_when_body_panics() {
        let root = tempfile::TempDir::new().unwrap();
        let root_path = root.path().to_path_buf();

        let handle = tokio::spawn(async move {
            with_staging_dir(&root_path, |_dir| async move {
                panic!("generator exploded");
            })
            .await
        });

        assert!(handle.await.unwrap_err().is_panic());
        assert!(list_staging_dirs(root.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn removed_when_cancelled() {
        let root = tempfile::TempDir::new().unwrap();
        let root_path = root.path().to_path_buf();

        let handle = tokio::spawn(async move {
            with_staging_dir(&root_path, |_dir| async move {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(list_staging_dirs(root.path()).unwrap().len(), 1);

        handle.abort();
        let _ = handle.await;
        assert!(list_staging_dirs(root.path()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn directories_are_unique() {
        let root = tempfile::TempDir::new().unwrap();

        let (a, b) = tokio::join!(
            with_staging_dir(root.path(), |dir| async move { dir }),
            with_staging_dir(root.path(), |dir| async move { dir }),
        );

        assert_ne!(a.unwrap(), b.unwrap());
    }
}

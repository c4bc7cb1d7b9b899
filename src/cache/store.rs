//! Artifact layout on disk
//!
//! Artifacts live at `<dir>/<fingerprint>.zip`, their locks at
//! `<dir>/<fingerprint>.zip.lock`. Nothing else is shared between processes.

use crate::cache::Fingerprint;
use std::io;
use std::path::{Path, PathBuf};

/// Artifact file extension
pub const ARTIFACT_EXTENSION: &str = "zip";

/// Suffix appended to an artifact path to name its lock
pub const LOCK_SUFFIX: &str = ".lock";

/// Directory of fingerprint-addressed artifacts
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical artifact path for a fingerprint
    pub fn artifact_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint, ARTIFACT_EXTENSION))
    }

    /// Lock path for a fingerprint
    pub fn lock_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        let mut path = self.artifact_path(fingerprint).into_os_string();
        path.push(LOCK_SUFFIX);
        PathBuf::from(path)
    }

    /// Path of the artifact if it has been built
    pub async fn lookup(&self, fingerprint: &Fingerprint) -> io::Result<Option<PathBuf>> {
        let path = self.artifact_path(fingerprint);
        if tokio::fs::try_exists(&path).await? {
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }

    /// Create the artifact directory if needed
    pub async fn ensure_dir(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }
}

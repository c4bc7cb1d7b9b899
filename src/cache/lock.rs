//! Advisory per-fingerprint file locks
//!
//! Locks are exclusive OS file locks (`flock(2)` on unix) on
//! `<artifact>.lock`, taken through `fs2`. The kernel drops
//! them when the holding process exits, so a builder that crashes mid-build
//! never leaves an orphaned lock behind; the lock file itself stays and is
//! reused. The holder records its pid and acquisition time in the file so a
//! waiter that gives up can say who it was waiting for.

use crate::error::LockError;
use chrono::Utc;
use fs2::FileExt;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How long and how often to try for a lock
#[derive(Debug, Clone, Copy)]
pub struct LockOptions {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between attempts while another holder has the lock
    pub poll_interval: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(600),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// A held lock. Released by [`LockGuard::release`], or on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: PathBuf,
}

impl LockGuard {
    /// Release the lock, reporting failures
    pub fn release(mut self) -> Result<(), LockError> {
        match self.file.take() {
            Some(file) => FileExt::unlock(&file).map_err(|source| LockError::ReleaseFailed {
                path: self.path.clone(),
                source,
            }),
            None => Ok(()),
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            // Closing the descriptor releases the lock as well
            if let Err(e) = FileExt::unlock(&file) {
                warn!("Failed to unlock {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Acquire the exclusive lock at `path`, waiting up to `options.timeout`.
///
/// Locks belong to the open file description, so two tasks of the same
/// process exclude each other just like two processes do.
pub async fn acquire(path: &Path, options: LockOptions) -> Result<LockGuard, LockError> {
    let failed = |reason: String| LockError::AcquireFailed {
        path: path.to_path_buf(),
        reason,
    };

    let file = tokio::fs::OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(path)
        .await
        .map_err(|e| failed(format!("opening lock file: {}", e)))?
        .into_std()
        .await;

    let deadline = Instant::now() + options.timeout;
    let mut waited = false;

    loop {
        if try_lock(&file).map_err(|e| failed(e.to_string()))? {
            break;
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(failed(format!(
                "timed out after {:?}, held by {}",
                options.timeout,
                read_holder(path).await
            )));
        }

        if !waited {
            debug!("Waiting for lock {} ({})", path.display(), read_holder(path).await);
            waited = true;
        }
        tokio::time::sleep(options.poll_interval.min(deadline - now)).await;
    }

    let guard = LockGuard {
        file: Some(file),
        path: path.to_path_buf(),
    };
    let guard = tokio::task::spawn_blocking(move || {
        if let Some(file) = guard.file.as_ref() {
            if let Err(e) = record_holder(file) {
                debug!("Could not record lock holder in {}: {}", guard.path.display(), e);
            }
        }
        guard
    })
    .await
    .map_err(|e| failed(format!("recording lock holder: {}", e)))?;

    debug!("Acquired lock {}", path.display());
    Ok(guard)
}

/// Whether nobody currently holds the lock at `path`
pub fn is_free(path: &Path) -> io::Result<bool> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e),
    };
    let free = try_lock(&file)?;
    if free {
        FileExt::unlock(&file)?;
    }
    Ok(free)
}

/// Non-blocking exclusive lock; `Ok(false)` while someone else holds it
fn try_lock(file: &File) -> io::Result<bool> {
    match FileExt::try_lock_exclusive(file) {
        Ok(()) => Ok(true),
        Err(e) if is_contended(&e) => Ok(false),
        Err(e) => Err(e),
    }
}

fn is_contended(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock
        || err.kind() == io::ErrorKind::Interrupted
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn record_holder(mut file: &File) -> io::Result<()> {
    file.set_len(0)?;
    writeln!(
        file,
        "pid={} acquired_at={}",
        std::process::id(),
        Utc::now().to_rfc3339()
    )?;
    file.flush()
}

async fn read_holder(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        _ => "an unknown holder".to_string(),
    }
}

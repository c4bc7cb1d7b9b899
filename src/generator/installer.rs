//! Generator package installation
//!
//! Installing is delegated to an external package manager process; any
//! non-zero exit is a failure.

use crate::error::ResolutionError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

/// Installs a generator package so that local lookup can find it
#[async_trait]
pub trait PackageInstaller: Send + Sync {
    /// Install `package` into the installer's prefix
    async fn install(&self, package: &str) -> Result<(), ResolutionError>;

    /// Directory packages end up in (searched after installing)
    fn packages_dir(&self) -> PathBuf;
}

/// Installer that shells out to `npm install --prefix <dir> --no-save <pkg>`
#[derive(Debug, Clone)]
pub struct CommandInstaller {
    program: String,
    prefix: PathBuf,
    timeout: Duration,
}

impl CommandInstaller {
    pub fn new(program: impl Into<String>, prefix: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            prefix: prefix.into(),
            timeout,
        }
    }
}

#[async_trait]
impl PackageInstaller for CommandInstaller {
    async fn install(&self, package: &str) -> Result<(), ResolutionError> {
        let failed = |reason: String| ResolutionError::InstallFailed {
            package: package.to_string(),
            reason,
        };

        tokio::fs::create_dir_all(&self.prefix)
            .await
            .map_err(|e| failed(format!("creating {}: {}", self.prefix.display(), e)))?;

        info!("Installing generator package {} into {}", package, self.prefix.display());
        debug!(
            "Executing: {} install --prefix {} --no-save {}",
            self.program,
            self.prefix.display(),
            package
        );

        let output = Command::new(&self.program)
            .arg("install")
            .arg("--prefix")
            .arg(&self.prefix)
            .arg("--no-save")
            .arg(package)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout, output).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(failed(format!("failed to run {}: {}", self.program, e))),
            Err(_) => return Err(failed(format!("timed out after {:?}", self.timeout))),
        };

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            Err(failed(format!("{} exited with {}: {}", self.program, code, stderr.trim())))
        }
    }

    fn packages_dir(&self) -> PathBuf {
        self.prefix.join("node_modules")
    }
}

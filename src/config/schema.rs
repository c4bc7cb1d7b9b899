//! Configuration schema for Stencil
//!
//! Configuration is stored at `~/.config/stencil/config.toml`

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Generator discovery and execution
    pub generators: GeneratorsConfig,

    /// On-demand package installation
    pub install: InstallConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Where artifacts and their locks live
    pub artifact_dir: PathBuf,

    /// Where staging directories are created
    pub staging_dir: PathBuf,

    /// Give up waiting for another builder after this many seconds
    pub lock_timeout_secs: u64,

    /// Delay between lock attempts in milliseconds
    pub lock_poll_ms: u64,

    /// Overall deadline for generate-and-wait (0 = wait forever)
    pub generate_timeout_secs: u64,
}

impl CacheConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_poll_interval(&self) -> Duration {
        Duration::from_millis(self.lock_poll_ms.max(1))
    }

    pub fn generate_timeout(&self) -> Option<Duration> {
        (self.generate_timeout_secs > 0).then(|| Duration::from_secs(self.generate_timeout_secs))
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            artifact_dir: std::env::temp_dir().join("stencil"),
            staging_dir: std::env::temp_dir(),
            lock_timeout_secs: 600,
            lock_poll_ms: 100,
            generate_timeout_secs: 0,
        }
    }
}

/// Generator discovery and execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorsConfig {
    /// Directories searched for generator packages, in order
    pub search_roots: Vec<PathBuf>,

    /// Kill a generator that runs longer than this many seconds
    pub generation_timeout_secs: u64,

    /// Stderr prefix a generator uses to report a fault
    pub fault_marker: String,
}

impl GeneratorsConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

impl Default for GeneratorsConfig {
    fn default() -> Self {
        Self {
            search_roots: vec![],
            generation_timeout_secs: 600,
            fault_marker: "STENCIL_FAULT:".to_string(),
        }
    }
}

/// Package installation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Allow installing missing generators (default: false)
    pub enabled: bool,

    /// Trusted packages: exact names, "@scope/*" or "*"
    pub allowed: Vec<String>,

    /// Package manager executable
    pub program: String,

    /// Install prefix; packages land in `<install_dir>/node_modules`
    pub install_dir: PathBuf,

    /// Kill the installer after this many seconds
    pub timeout_secs: u64,
}

impl InstallConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed: vec![],
            program: "npm".to_string(),
            install_dir: dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("stencil")
                .join("downloaded"),
            timeout_secs: 300,
        }
    }
}

//! Error types for Stencil
//!
//! Library operations return one of the focused error enums below; the CLI
//! and configuration layers use `StencilResult<T>`.

use crate::cache::Fingerprint;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for Stencil operations
pub type StencilResult<T> = Result<T, StencilError>;

/// Failures while mapping a generator name to something runnable
#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("Generator not found: {name} (searched: {searched})")]
    NotFound { name: String, searched: String },

    #[error("Failed to install generator package {package}: {reason}")]
    InstallFailed { package: String, reason: String },

    #[error("Generator {name} found at {path} but it has no usable entry point")]
    ResolutionFailed { name: String, path: PathBuf },

    #[error("Invalid generator name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Failures while running a generator or packaging its output
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generator failed: {0}")]
    CapabilityFault(String),

    #[error("Failed to package artifact {path}: {reason}")]
    PackagingFault { path: PathBuf, reason: String },
}

impl GenerationError {
    pub(crate) fn packaging(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::PackagingFault {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Failures of the per-fingerprint file lock
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Failed to acquire lock {path}: {reason}")]
    AcquireFailed { path: PathBuf, reason: String },

    #[error("Failed to release lock {path}: {source}")]
    ReleaseFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What went wrong during a build
#[derive(Error, Debug)]
pub enum BuildErrorKind {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Staging failed: {context}")]
    Staging {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out after {0:?} waiting for the artifact")]
    Timeout(Duration),

    #[error("Build task ended unexpectedly: {0}")]
    Aborted(String),
}

/// A failed build, tagged with the fingerprint it was building
#[derive(Error, Debug)]
#[error("Build {fingerprint} failed: {kind}")]
pub struct BuildError {
    pub fingerprint: Fingerprint,
    pub kind: BuildErrorKind,
}

impl BuildError {
    /// Wrap any build failure with its fingerprint
    pub fn new(fingerprint: Fingerprint, kind: impl Into<BuildErrorKind>) -> Self {
        Self {
            fingerprint,
            kind: kind.into(),
        }
    }

    /// Whether a later attempt with the same request may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            BuildErrorKind::Resolution(ResolutionError::InstallFailed { .. })
                | BuildErrorKind::Lock(_)
                | BuildErrorKind::Staging { .. }
                | BuildErrorKind::Timeout(_)
                | BuildErrorKind::Aborted(_)
        )
    }
}

/// All errors surfaced by the CLI and configuration layers
#[derive(Error, Debug)]
pub enum StencilError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Build errors
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("Invalid fingerprint '{0}': expected 64 lowercase hex characters")]
    InvalidFingerprint(String),

    #[error("Invalid request file {path}: {reason}")]
    RequestInvalid { path: PathBuf, reason: String },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),
}

impl StencilError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Build(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::Build(e) => match &e.kind {
                BuildErrorKind::Resolution(ResolutionError::NotFound { .. }) => Some(
                    "Add the generator under a [generators] search root, or enable [install] and allow-list the package",
                ),
                BuildErrorKind::Resolution(ResolutionError::InstallFailed { .. }) => {
                    Some("Check network access to the package registry and retry")
                }
                BuildErrorKind::Lock(LockError::AcquireFailed { .. }) => Some(
                    "Another build of the same request is still running; retry later or raise cache.lock_timeout_secs",
                ),
                BuildErrorKind::Timeout(_) => Some(
                    "The build was still running at the deadline; retry with a longer --timeout or use `stencil start`",
                ),
                _ => None,
            },
            Self::InvalidFingerprint(_) => Some("Use the value printed by `stencil start`"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::fingerprint;
    use crate::request::GenerationRequest;

    fn fp() -> Fingerprint {
        fingerprint(&GenerationRequest::new("svc-template"))
    }

    #[test]
    fn error_display() {
        let err = BuildError::new(
            fp(),
            ResolutionError::NotFound {
                name: "missing-pkg".to_string(),
                searched: "/generators".to_string(),
            },
        );
        let text = err.to_string();
        assert!(text.contains(fp().as_str()));
        assert!(text.contains("Generator not found: missing-pkg"));
    }

    #[test]
    fn install_failure_is_retryable() {
        let err = BuildError::new(
            fp(),
            ResolutionError::InstallFailed {
                package: "generator-x".to_string(),
                reason: "exit code 1".to_string(),
            },
        );
        assert!(err.is_retryable());
    }

    #[test]
    fn not_found_is_permanent() {
        let err = BuildError::new(
            fp(),
            ResolutionError::NotFound {
                name: "missing-pkg".to_string(),
                searched: String::new(),
            },
        );
        assert!(!err.is_retryable());

        let fault = BuildError::new(fp(), GenerationError::CapabilityFault("boom".into()));
        assert!(!fault.is_retryable());
    }

    #[test]
    fn error_hint() {
        let err = StencilError::from(BuildError::new(fp(), BuildErrorKind::Timeout(Duration::from_secs(1))));
        assert!(err.hint().unwrap().contains("stencil start"));
        assert!(err.is_retryable());
        assert_eq!(StencilError::User("x".into()).hint(), None);
    }
}

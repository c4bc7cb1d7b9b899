//! Entry points for callers
//!
//! Three ways in: wait for the artifact, start a build and walk away, or ask
//! whether an artifact is ready yet.

use crate::cache::Fingerprint;
use crate::coordinator::BuildCoordinator;
use crate::error::{BuildError, BuildErrorKind};
use crate::request::GenerationRequest;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Result of [`RequestFacade::poll_artifact`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactStatus {
    Ready(PathBuf),
    NotReady,
}

impl ArtifactStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// A build started in the background
pub struct StartedBuild {
    pub fingerprint: Fingerprint,
    pub handle: JoinHandle<Result<PathBuf, BuildError>>,
}

/// Request-level API over a shared coordinator
#[derive(Clone)]
pub struct RequestFacade {
    coordinator: Arc<BuildCoordinator>,
    deadline: Option<Duration>,
}

impl RequestFacade {
    pub fn new(coordinator: Arc<BuildCoordinator>) -> Self {
        Self {
            coordinator,
            deadline: None,
        }
    }

    /// Bound `generate_and_wait` by an overall deadline
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn coordinator(&self) -> &BuildCoordinator {
        &self.coordinator
    }

    /// Build (or reuse) the artifact and wait for its path.
    ///
    /// The build runs on its own task. When the deadline passes first the
    /// caller gets `Timeout` and the build carries on detached.
    pub async fn generate_and_wait(&self, request: GenerationRequest) -> Result<PathBuf, BuildError> {
        let started = self.spawn(request);
        let fingerprint = started.fingerprint;
        let mut handle = started.handle;

        let joined = match self.deadline {
            Some(deadline) => match tokio::time::timeout(deadline, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    info!("Stopped waiting for {} after {:?}; build continues", fingerprint, deadline);
                    return Err(BuildError::new(fingerprint, BuildErrorKind::Timeout(deadline)));
                }
            },
            None => handle.await,
        };

        joined.unwrap_or_else(|e| Err(BuildError::new(fingerprint, BuildErrorKind::Aborted(e.to_string()))))
    }

    /// Start a build and return its fingerprint immediately.
    ///
    /// Failures are logged; use [`poll_artifact`](Self::poll_artifact) to find
    /// out when the artifact is ready.
    pub fn start_generation(&self, request: GenerationRequest) -> Fingerprint {
        self.start_tracked(request).fingerprint
    }

    /// Like [`start_generation`](Self::start_generation), also handing back the
    /// build task for callers that must not exit before it finishes
    pub fn start_tracked(&self, request: GenerationRequest) -> StartedBuild {
        let started = self.spawn(request);
        let fingerprint = started.fingerprint.clone();
        let inner = started.handle;

        let handle = tokio::spawn(async move {
            let result = match inner.await {
                Ok(result) => result,
                Err(e) => Err(BuildError::new(fingerprint.clone(), BuildErrorKind::Aborted(e.to_string()))),
            };
            if let Err(e) = &result {
                error!("Background build {} failed: {}", fingerprint, e);
            }
            result
        });

        StartedBuild {
            fingerprint: started.fingerprint,
            handle,
        }
    }

    /// Whether the artifact for `fingerprint` exists. Never takes the lock.
    pub async fn poll_artifact(&self, fingerprint: &Fingerprint) -> ArtifactStatus {
        match self.coordinator.store().lookup(fingerprint).await {
            Ok(Some(path)) => ArtifactStatus::Ready(path),
            Ok(None) => ArtifactStatus::NotReady,
            Err(e) => {
                debug!("Checking artifact {} failed: {}", fingerprint, e);
                ArtifactStatus::NotReady
            }
        }
    }

    fn spawn(&self, request: GenerationRequest) -> StartedBuild {
        let fingerprint = self.coordinator.fingerprint(&request);
        debug!("Starting build {} for {}", fingerprint, request.generator());

        let coordinator = self.coordinator.clone();
        let handle = tokio::spawn(async move { coordinator.ensure_artifact(&request).await });
        StartedBuild { fingerprint, handle }
    }
}

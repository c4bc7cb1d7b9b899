//! Build coordination
//!
//! One build per fingerprint at a time, across tasks and processes:
//!
//! ```text
//! Idle -> LockAcquiring -> CacheHit -> LockReleasing -> Done
//!                       -> Building -> LockReleasing -> Done | Failed
//! ```
//!
//! The artifact is re-checked after the lock is taken, so a waiter that lost
//! the race picks up the winner's artifact instead of building again.

use crate::cache::{fingerprint, lock, ArtifactStore, Fingerprint, LockOptions};
use crate::config::Config;
use crate::error::{BuildError, BuildErrorKind};
use crate::generator::{CommandInstaller, GeneratorResolver, InstallPolicy, LocalResolver};
use crate::request::GenerationRequest;
use crate::runner::GenerationRunner;
use crate::staging;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a build currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Idle,
    LockAcquiring,
    CacheHit,
    Building,
    LockReleasing,
    Done,
    Failed,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::LockAcquiring => "lock-acquiring",
            Self::CacheHit => "cache-hit",
            Self::Building => "building",
            Self::LockReleasing => "lock-releasing",
            Self::Done => "done",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// Turns requests into artifacts, building each fingerprint at most once
pub struct BuildCoordinator {
    store: ArtifactStore,
    resolver: Arc<dyn GeneratorResolver>,
    runner: GenerationRunner,
    staging_root: PathBuf,
    lock_options: LockOptions,
}

impl BuildCoordinator {
    pub fn new(
        store: ArtifactStore,
        resolver: Arc<dyn GeneratorResolver>,
        staging_root: impl Into<PathBuf>,
        lock_options: LockOptions,
    ) -> Self {
        Self {
            store,
            resolver,
            runner: GenerationRunner::new(),
            staging_root: staging_root.into(),
            lock_options,
        }
    }

    /// Wire up a coordinator from configuration.
    ///
    /// The installer's package directory is always searched, so packages
    /// installed earlier stay visible when installation is later disabled.
    pub fn from_config(config: &Config) -> Self {
        let installer = CommandInstaller::new(
            config.install.program.clone(),
            config.install.install_dir.clone(),
            config.install.timeout(),
        );
        let policy = InstallPolicy {
            enabled: config.install.enabled,
            allowed: config.install.allowed.clone(),
        };
        let resolver = LocalResolver::new(
            config.generators.search_roots.clone(),
            config.generators.generation_timeout(),
            config.generators.fault_marker.clone(),
        )
        .with_installer(Arc::new(installer), policy);

        Self::new(
            ArtifactStore::new(config.cache.artifact_dir.clone()),
            Arc::new(resolver),
            config.cache.staging_dir.clone(),
            LockOptions {
                timeout: config.cache.lock_timeout(),
                poll_interval: config.cache.lock_poll_interval(),
            },
        )
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn fingerprint(&self, request: &GenerationRequest) -> Fingerprint {
        fingerprint(request)
    }

    pub fn artifact_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.store.artifact_path(fingerprint)
    }

    /// Return the artifact for `request`, building it if nobody has yet.
    pub async fn ensure_artifact(&self, request: &GenerationRequest) -> Result<PathBuf, BuildError> {
        let fp = self.fingerprint(request);
        let mut phase = Phase::new(&fp);

        if let Ok(Some(path)) = self.store.lookup(&fp).await {
            phase.enter(BuildPhase::CacheHit);
            info!("Cache hit for {} at {}", fp, path.display());
            phase.enter(BuildPhase::Done);
            return Ok(path);
        }

        self.store.ensure_dir().await.map_err(|source| {
            phase.enter(BuildPhase::Failed);
            BuildError::new(
                fp.clone(),
                BuildErrorKind::Staging {
                    context: format!("creating artifact directory {}", self.store.dir().display()),
                    source,
                },
            )
        })?;

        phase.enter(BuildPhase::LockAcquiring);
        let guard = match lock::acquire(&self.store.lock_path(&fp), self.lock_options).await {
            Ok(guard) => guard,
            Err(e) => {
                phase.enter(BuildPhase::Failed);
                return Err(BuildError::new(fp, e));
            }
        };

        let result = self.build_locked(&fp, request, &mut phase).await;

        phase.enter(BuildPhase::LockReleasing);
        if let Err(e) = guard.release() {
            warn!("{}", e);
        }

        match result {
            Ok(path) => {
                phase.enter(BuildPhase::Done);
                Ok(path)
            }
            Err(kind) => {
                phase.enter(BuildPhase::Failed);
                Err(BuildError::new(fp, kind))
            }
        }
    }

    /// Everything that happens while the lock is held
    async fn build_locked(
        &self,
        fp: &Fingerprint,
        request: &GenerationRequest,
        phase: &mut Phase<'_>,
    ) -> Result<PathBuf, BuildErrorKind> {
        let existing = self
            .store
            .lookup(fp)
            .await
            .map_err(|source| BuildErrorKind::Staging {
                context: format!("checking for artifact {}", self.artifact_path(fp).display()),
                source,
            })?;
        if let Some(path) = existing {
            phase.enter(BuildPhase::CacheHit);
            info!("Artifact for {} was built while waiting", fp);
            return Ok(path);
        }

        phase.enter(BuildPhase::Building);
        info!("Building {} with {}", fp, request.generator());
        let artifact = self.artifact_path(fp);

        staging::with_staging_dir(&self.staging_root, |dir| self.build_in(dir, request, artifact))
            .await
            .map_err(|source| BuildErrorKind::Staging {
                context: format!("creating staging directory in {}", self.staging_root.display()),
                source,
            })?
    }

    async fn build_in(
        &self,
        dir: PathBuf,
        request: &GenerationRequest,
        artifact: PathBuf,
    ) -> Result<PathBuf, BuildErrorKind> {
        let capability = self.resolver.resolve(request.generator()).await?;
        debug!("Resolved {} to {}", request.generator(), capability.describe());

        let path = self
            .runner
            .run(capability, &dir, request, &artifact)
            .await?;
        Ok(path)
    }
}

/// Logs phase transitions for one fingerprint
struct Phase<'a> {
    fingerprint: &'a Fingerprint,
    current: BuildPhase,
}

impl<'a> Phase<'a> {
    fn new(fingerprint: &'a Fingerprint) -> Self {
        Self {
            fingerprint,
            current: BuildPhase::Idle,
        }
    }

    fn enter(&mut self, next: BuildPhase) {
        debug!("{}: {} -> {}", self.fingerprint, self.current, next);
        self.current = next;
    }
}

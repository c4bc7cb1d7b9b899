//! Generator resolution
//!
//! Resolves generator names to runnable capabilities by searching, in order:
//! 1. Nested layout: `{root}/{package}/generators/{sub}/`
//! 2. Flat layout: `{root}/{package}/{sub}/`
//! 3. Install-then-retry: install the package (if enabled and trusted), then
//!    run steps 1 and 2 exactly once more.
//!
//! Roots are the configured search roots followed by the installer's package
//! directory.

use crate::error::ResolutionError;
use crate::generator::capability::GenerationCapability;
use crate::generator::installer::PackageInstaller;
use crate::generator::process::ProcessGenerator;
use crate::request::GeneratorId;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Optional manifest inside a generator directory
pub const MANIFEST_FILE: &str = "generator.toml";

/// Entry point used when no manifest names one
pub const CONVENTIONAL_ENTRY: &str = "run";

/// Maps a generator name to something that can run it
#[async_trait]
pub trait GeneratorResolver: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn GenerationCapability>, ResolutionError>;
}

/// Whether missing packages may be installed
#[derive(Debug, Clone, Default)]
pub struct InstallPolicy {
    /// Master switch
    pub enabled: bool,

    /// Trusted packages: exact names, `@scope/*`, or `*`
    pub allowed: Vec<String>,
}

impl InstallPolicy {
    /// Check whether `package` may be installed
    pub fn allows(&self, package: &str) -> bool {
        if !self.enabled {
            return false;
        }
        self.allowed.iter().any(|pattern| {
            if pattern == "*" || pattern == package {
                return true;
            }
            match pattern.strip_suffix('*') {
                Some(prefix) if prefix.ends_with('/') => package.starts_with(prefix),
                _ => false,
            }
        })
    }
}

/// The two directory conventions a generator package may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    Nested,
    Flat,
}

impl Layout {
    fn all() -> &'static [Self] {
        &[Self::Nested, Self::Flat]
    }

    fn candidate(&self, root: &Path, id: &GeneratorId) -> PathBuf {
        let package = root.join(id.package());
        match self {
            Self::Nested => package.join("generators").join(id.subgenerator()),
            Self::Flat => package.join(id.subgenerator()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GeneratorManifest {
    entry: Option<String>,
}

/// Outcome of inspecting one candidate directory
#[derive(Debug)]
enum Candidate {
    Runnable(PathBuf),
    Unusable,
    Missing,
}

/// Resolver over local directories with optional on-demand installation
pub struct LocalResolver {
    search_roots: Vec<PathBuf>,
    installer: Option<Arc<dyn PackageInstaller>>,
    policy: InstallPolicy,
    generation_timeout: Duration,
    fault_marker: String,
}

impl LocalResolver {
    pub fn new(
        search_roots: Vec<PathBuf>,
        generation_timeout: Duration,
        fault_marker: impl Into<String>,
    ) -> Self {
        Self {
            search_roots,
            installer: None,
            policy: InstallPolicy::default(),
            generation_timeout,
            fault_marker: fault_marker.into(),
        }
    }

    /// Attach an installer and the policy that governs it
    pub fn with_installer(mut self, installer: Arc<dyn PackageInstaller>, policy: InstallPolicy) -> Self {
        self.installer = Some(installer);
        self.policy = policy;
        self
    }

    fn roots(&self) -> Vec<PathBuf> {
        let mut roots = self.search_roots.clone();
        if let Some(installer) = &self.installer {
            roots.push(installer.packages_dir());
        }
        roots
    }

    fn candidates(&self, id: &GeneratorId) -> Vec<PathBuf> {
        let roots = self.roots();
        Layout::all()
            .iter()
            .flat_map(|layout| roots.iter().map(move |root| layout.candidate(root, id)))
            .collect()
    }

    /// Walk every candidate; the first runnable one wins.
    ///
    /// A directory that exists but has no entry point only becomes an error
    /// when no other candidate is runnable.
    async fn lookup(&self, id: &GeneratorId) -> Result<Option<PathBuf>, ResolutionError> {
        let mut unusable = None;

        for dir in self.candidates(id) {
            match inspect(&dir).await {
                Candidate::Runnable(entry) => {
                    debug!("Resolved {} to {}", id, entry.display());
                    return Ok(Some(entry));
                }
                Candidate::Unusable => {
                    debug!("Generator directory {} has no entry point", dir.display());
                    unusable.get_or_insert(dir);
                }
                Candidate::Missing => {}
            }
        }

        match unusable {
            Some(path) => Err(ResolutionError::ResolutionFailed {
                name: id.to_string(),
                path,
            }),
            None => Ok(None),
        }
    }

    fn not_found(&self, id: &GeneratorId) -> ResolutionError {
        let searched = self
            .candidates(id)
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>();
        ResolutionError::NotFound {
            name: id.to_string(),
            searched: if searched.is_empty() {
                "no search roots configured".to_string()
            } else {
                searched.join(", ")
            },
        }
    }

    fn capability(&self, id: &GeneratorId, entry: PathBuf) -> Arc<dyn GenerationCapability> {
        Arc::new(ProcessGenerator::new(
            id.to_string(),
            entry,
            self.generation_timeout,
            self.fault_marker.clone(),
        ))
    }
}

#[async_trait]
impl GeneratorResolver for LocalResolver {
    async fn resolve(&self, name: &str) -> Result<Arc<dyn GenerationCapability>, ResolutionError> {
        let id = GeneratorId::parse(name)?;

        if let Some(entry) = self.lookup(&id).await? {
            return Ok(self.capability(&id, entry));
        }

        let installer = match &self.installer {
            Some(installer) if self.policy.allows(id.package()) => installer,
            _ => {
                debug!("Not installing {}: installation disabled or package not trusted", id);
                return Err(self.not_found(&id));
            }
        };

        installer.install(id.package()).await?;
        info!("Installed {}, retrying resolution", id.package());

        match self.lookup(&id).await? {
            Some(entry) => Ok(self.capability(&id, entry)),
            None => Err(self.not_found(&id)),
        }
    }
}

/// Find the entry point of a generator directory.
///
/// A manifest may name the entry; when it is absent, or the manifest hides
/// or misnames it, the conventional `run` file is used instead.
async fn inspect(dir: &Path) -> Candidate {
    if !dir.is_dir() {
        return Candidate::Missing;
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    if manifest_path.exists() {
        match read_manifest(&manifest_path).await {
            Some(entry) if is_relative_inside(&entry) && dir.join(&entry).is_file() => {
                return Candidate::Runnable(dir.join(entry));
            }
            _ => debug!(
                "{} does not name a usable entry, falling back to {}",
                manifest_path.display(),
                CONVENTIONAL_ENTRY
            ),
        }
    }

    let conventional = dir.join(CONVENTIONAL_ENTRY);
    if conventional.is_file() {
        Candidate::Runnable(conventional)
    } else {
        Candidate::Unusable
    }
}

async fn read_manifest(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    match toml::from_str::<GeneratorManifest>(&content) {
        Ok(manifest) => manifest.entry,
        Err(e) => {
            debug!("Ignoring invalid manifest {}: {}", path.display(), e);
            None
        }
    }
}

fn is_relative_inside(entry: &str) -> bool {
    let path = Path::new(entry);
    !entry.is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

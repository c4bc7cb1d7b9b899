//! Running one generation attempt
//!
//! The runner invokes a capability inside a staging directory, merges every
//! failure channel into one result, and packages the output.

use crate::archive;
use crate::error::GenerationError;
use crate::generator::{fault_channel, GenerationCapability, InvocationContext};
use crate::request::GenerationRequest;
use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Runs capabilities and packages their output
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerationRunner;

impl GenerationRunner {
    pub fn new() -> Self {
        Self
    }

    /// Generate into `dir` and archive it to `artifact`.
    ///
    /// Writes exactly one file at `artifact` on success and nothing on
    /// failure.
    pub async fn run(
        &self,
        capability: Arc<dyn GenerationCapability>,
        dir: &Path,
        request: &GenerationRequest,
        artifact: &Path,
    ) -> Result<PathBuf, GenerationError> {
        self.invoke(capability, dir, request).await?;

        info!("Packaging {}", artifact.display());
        archive::write_atomic(dir, artifact).await
    }

    /// Invoke the capability and observe its fault channel for the duration
    /// of the call.
    ///
    /// The capability runs on its own task so a panic surfaces as a fault
    /// instead of unwinding through the coordinator.
    async fn invoke(
        &self,
        capability: Arc<dyn GenerationCapability>,
        dir: &Path,
        request: &GenerationRequest,
    ) -> Result<(), GenerationError> {
        let (faults, mut observer) = fault_channel();
        let attempt = observer.attempt();
        let description = capability.describe();
        debug!("Attempt {}: invoking {}", attempt, description);

        let ctx = InvocationContext {
            working_dir: dir.to_path_buf(),
            request: request.clone(),
            faults,
        };
        let task = AbortOnDrop(tokio::spawn(async move { capability.invoke(ctx).await }));

        let returned = match task.join().await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(GenerationError::CapabilityFault(format!(
                "{} panicked: {}",
                description,
                panic_message(e.into_panic())
            ))),
            Err(e) => Err(GenerationError::CapabilityFault(format!(
                "{} was cancelled: {}",
                description, e
            ))),
        };

        let background = observer.drain();
        drop(observer);

        match returned {
            Err(e) => {
                for fault in &background {
                    warn!("Attempt {}: additional fault: {}", attempt, fault);
                }
                Err(e)
            }
            Ok(()) if !background.is_empty() => {
                debug!(
                    "Attempt {}: {} reported success but raised {} fault(s)",
                    attempt,
                    description,
                    background.len()
                );
                Err(GenerationError::CapabilityFault(background.join("; ")))
            }
            Ok(()) => Ok(()),
        }
    }
}

/// Aborts the capability task if the attempt itself is dropped
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> AbortOnDrop<T> {
    async fn join(mut self) -> Result<T, tokio::task::JoinError> {
        (&mut self.0).await
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

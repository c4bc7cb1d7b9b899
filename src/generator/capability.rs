//! Generation capability abstraction
//!
//! A capability is the opaque unit of work that populates a working
//! directory from a request. The resolver hands out process-backed
//! capabilities; tests plug in their own.

use crate::error::GenerationError;
use crate::generator::fault::FaultSink;
use crate::request::GenerationRequest;
use async_trait::async_trait;
use std::path::PathBuf;

/// Inputs for a single invocation
#[derive(Debug, Clone)]
pub struct InvocationContext {
    /// Directory the generator must write into
    pub working_dir: PathBuf,

    /// The request being built
    pub request: GenerationRequest,

    /// Channel for faults raised outside the call's own result
    pub faults: FaultSink,
}

/// Abstract generator interface
///
/// Implementations may fail by returning an error, by reporting to
/// `ctx.faults` (possibly from a background task), or by panicking; the
/// runner treats all three the same way.
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Populate `ctx.working_dir`
    async fn invoke(&self, ctx: InvocationContext) -> Result<(), GenerationError>;

    /// Human-readable description for logs
    fn describe(&self) -> String;
}

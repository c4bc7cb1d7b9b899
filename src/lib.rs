//! Stencil - fingerprinted build cache for generated projects
//!
//! Runs a project generator at most once per distinct request, packages the
//! output as a zip artifact named after the request's fingerprint, and
//! coordinates concurrent requests for the same artifact across tasks and
//! processes.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod facade;
pub mod generator;
pub mod logging;
pub mod request;
pub mod runner;
pub mod staging;
pub mod ui;

pub use coordinator::BuildCoordinator;
pub use error::{BuildError, StencilError, StencilResult};
pub use facade::{ArtifactStatus, RequestFacade};
pub use request::GenerationRequest;

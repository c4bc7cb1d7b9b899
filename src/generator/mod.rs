//! Generator discovery and execution
//!
//! - `resolver`: name → capability, with install-on-demand
//! - `process`: capability backed by an executable entry point
//! - `fault`: per-attempt channel for faults outside the return path

pub mod capability;
pub mod fault;
pub mod installer;
pub mod process;
pub mod resolver;

pub use capability::{GenerationCapability, InvocationContext};
pub use fault::{fault_channel, FaultObserver, FaultSink};
pub use installer::{CommandInstaller, PackageInstaller};
pub use process::ProcessGenerator;
pub use resolver::{GeneratorResolver, InstallPolicy, LocalResolver};

//! Terminal output for the CLI
//!
//! Spinners and status lines go to stderr so stdout stays parseable: it only
//! ever carries an artifact path or a fingerprint. Falls back to plain
//! prefixed lines in CI and when stderr is not a terminal.

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{step_ok, step_ok_detail};
pub use progress::TaskSpinner;

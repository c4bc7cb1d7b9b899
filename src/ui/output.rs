//! Status lines for consistent CLI formatting
//!
//! Everything here writes to stderr.

use super::context::UiContext;
use console::style;

/// Display a success step
pub fn step_ok(ctx: &UiContext, message: &str) {
    if ctx.use_fancy_output() {
        eprintln!("{} {}", style("✓").green(), message);
    } else {
        eprintln!("{} {}", style("[OK]").green(), message);
    }
}

/// Display a success step with a dimmed detail
pub fn step_ok_detail(ctx: &UiContext, message: &str, detail: &str) {
    step_ok(ctx, &format!("{} {}", message, style(detail).dim()));
}

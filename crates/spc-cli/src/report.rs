//! Rendering of fatal errors

use colored::Colorize;
use spc_core::ErrorKind;

use crate::error::CliError;

/// Lines printed to stderr for `error`.
pub fn render(error: &CliError) -> Vec<String> {
    if error.kind() == ErrorKind::Interrupted {
        return vec![format!("{} build interrupted by user", "interrupted:".yellow().bold())];
    }

    let mut lines = vec![format!("{}: {}", "error".red().bold(), error)];
    let CliError::Core(core) = error else {
        return lines;
    };

    if !core.stack().is_empty() {
        lines.push(format!("  {}", "stage stack (innermost first):".dimmed()));
        for frame in core.stack() {
            lines.push(format!("    at {frame}"));
        }
    }
    if let spc_core::Error::Artifact(fetch) = core.root()
        && let Some(attempted) = fetch.attempted()
    {
        lines.push(format!("  {} {}", "attempted:".dimmed(), attempted));
    }
    lines.push(format!(
        "  {} {} (exit code {})",
        "kind:".dimmed(),
        core.kind(),
        core.kind().exit_code()
    ));
    lines
}

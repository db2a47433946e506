//! Registry validation command

use colored::Colorize;

use crate::error::Result;
use crate::session::Session;

/// Run the validate command
pub fn run_validate(session: &Session) -> Result<()> {
    let registry = session.registry()?;
    println!(
        "{} {} packages and {} artifacts in {} registr{}",
        "ok:".green().bold(),
        registry.packages().count(),
        registry.artifacts().count(),
        session.config.registries.len(),
        if session.config.registries.len() == 1 { "y" } else { "ies" }
    );
    Ok(())
}

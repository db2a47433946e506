//! Dependency resolution command

use colored::Colorize;
use serde_json::json;
use spc_core::Resolution;

use crate::cli::ResolveArgs;
use crate::error::Result;
use crate::session::Session;

/// Run the resolve command
pub fn run_resolve(session: &Session, args: &ResolveArgs, why: bool, json: bool) -> Result<()> {
    let ctx = session.build_context(args)?;
    let resolution = ctx.resolution();

    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(resolution)).unwrap_or_default());
        return Ok(());
    }

    println!(
        "{} for {}",
        "Build order".bold(),
        ctx.platform().to_string().cyan()
    );
    for (index, package) in resolution.order.iter().enumerate() {
        let pulled_by = resolution.why.get(package).map(Vec::as_slice).unwrap_or_default();
        if why && !pulled_by.is_empty() {
            println!(
                "  {:>3}. {} {}",
                index + 1,
                package.green(),
                format!("(required by {})", pulled_by.join(", ")).dimmed()
            );
        } else {
            println!("  {:>3}. {}", index + 1, package.green());
        }
    }

    if !resolution.excluded_suggests.is_empty() {
        println!();
        println!("{}", "Suggested but not selected:".yellow());
        for skipped in &resolution.excluded_suggests {
            println!(
                "  {} {}",
                skipped.package,
                format!("(suggested by {})", skipped.suggested_by.join(", ")).dimmed()
            );
        }
        println!("Use {} to include them.", "--with-suggested".cyan());
    }
    Ok(())
}

fn to_json(resolution: &Resolution) -> serde_json::Value {
    json!({
        "order": resolution.order,
        "excluded_suggests": resolution
            .excluded_suggests
            .iter()
            .map(|s| json!({ "package": s.package, "suggested_by": s.suggested_by }))
            .collect::<Vec<_>>(),
        "why": resolution.why,
    })
}

//! Lock inspection commands

use colored::Colorize;
use serde_json::{Map, Value};
use spc_artifact::LockFile;
use spc_config::Platform;

use crate::error::{CliError, Result};
use crate::session::Session;

fn open(session: &Session) -> Result<LockFile> {
    Ok(LockFile::open(&session.config.directories().lock_path())?)
}

/// Run the lock list command
pub fn run_lock_list(session: &Session, json: bool) -> Result<()> {
    let lock = open(session)?;

    if json {
        let mut out: Map<String, Value> = Map::new();
        for (artifact, entry) in lock.iter() {
            let value = serde_json::to_value(entry).map_err(|e| CliError::user(e.to_string()))?;
            let slot = out
                .entry(artifact.to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            if let Value::Array(entries) = slot {
                entries.push(value);
            }
        }
        println!(
            "{}",
            serde_json::to_string_pretty(&Value::Object(out)).unwrap_or_default()
        );
        return Ok(());
    }

    if lock.is_empty() {
        println!("{}", "Nothing downloaded yet.".dimmed());
        return Ok(());
    }

    println!("{}", "Locked downloads".bold());
    for (artifact, entry) in lock.iter() {
        let hash = entry.hash.as_deref().unwrap_or("-");
        println!(
            "  {:<20} {:<24} {:<8} {:<12} {}",
            artifact.green(),
            entry.kind().to_string(),
            format!("{:?}", entry.cache_type).to_lowercase(),
            entry.version.as_deref().unwrap_or("-"),
            hash.dimmed()
        );
    }
    Ok(())
}

/// Run the lock remove command
pub fn run_lock_remove(session: &Session, artifact: &str, binary: Option<Platform>) -> Result<()> {
    let mut lock = open(session)?;
    let removed = match binary {
        Some(platform) => lock.remove_binary(artifact, platform)?,
        None => lock.remove_source(artifact)?,
    };
    let what = match binary {
        Some(platform) => format!("binary {platform}"),
        None => "source".to_string(),
    };
    if removed {
        println!("{} Removed {} entry of {}", "ok:".green().bold(), what, artifact.cyan());
        Ok(())
    } else {
        Err(CliError::user(format!("No {what} entry for artifact [{artifact}] in the lock")))
    }
}

//! Static PHP builder CLI
//!
//! Resolves package dependencies, downloads and extracts the artifacts they
//! need, and reports failures with a per-kind exit code.

mod cli;
mod commands;
mod error;
mod interrupt;
mod report;
mod session;

use clap::Parser;
use colored::Colorize;
use spc_core::CancelToken;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands, LockAction};
use error::Result;
use session::Session;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cancel = CancelToken::new();
    interrupt::install(cancel.clone());

    if let Err(e) = run(cli, cancel) {
        for line in report::render(&e) {
            eprintln!("{line}");
        }
        std::process::exit(e.exit_code());
    }
}

/// `RUST_LOG` wins; otherwise warnings, or debug output with `--verbose`.
fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(std::io::stderr)
        .finish();
    if tracing::subscriber::set_global_default(subscriber).is_ok() {
        tracing::debug!("Verbose mode enabled");
    }
}

fn run(cli: Cli, cancel: CancelToken) -> Result<()> {
    let Some(command) = cli.command.clone() else {
        println!("{} static PHP builder", "spc".green().bold());
        println!();
        println!("Run {} for available commands.", "spc --help".cyan());
        return Ok(());
    };

    let session = Session::open(&cli, cancel)?;
    match command {
        Commands::Validate => commands::run_validate(&session),
        Commands::Resolve { resolve, why, json } => {
            commands::run_resolve(&session, &resolve, why, json)
        }
        Commands::Download { resolve, fetch } => commands::run_download(&session, &resolve, &fetch),
        Commands::Extract { resolve, fetch } => commands::run_extract(&session, &resolve, &fetch),
        Commands::Lock { action } => match action {
            LockAction::List { json } => commands::run_lock_list(&session, json),
            LockAction::Remove { artifact, binary } => {
                commands::run_lock_remove(&session, &artifact, binary)
            }
        },
    }
}

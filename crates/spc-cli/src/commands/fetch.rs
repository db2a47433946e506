//! Download and extract commands

use std::sync::Arc;

use colored::Colorize;
use spc_artifact::{FetchKind, Fetcher};
use spc_core::{ArtifactStages, BuildContext, Pipeline, StageContext};

use crate::cli::{FetchArgs, ResolveArgs};
use crate::error::Result;
use crate::session::Session;

/// Run the download command
pub fn run_download(session: &Session, resolve: &ResolveArgs, fetch: &FetchArgs) -> Result<()> {
    let ctx = session.build_context(resolve)?;
    let fetcher = Arc::new(session.fetcher(fetch)?);
    run_stages(session, &ctx, fetcher, fetch, false)
}

/// Run the extract command
pub fn run_extract(session: &Session, resolve: &ResolveArgs, fetch: &FetchArgs) -> Result<()> {
    let ctx = session.build_context(resolve)?;
    let fetcher = Arc::new(session.fetcher(fetch)?);
    run_stages(session, &ctx, fetcher, fetch, true)
}

fn run_stages(
    session: &Session,
    ctx: &BuildContext,
    fetcher: Arc<Fetcher>,
    fetch: &FetchArgs,
    extract: bool,
) -> Result<()> {
    let extractor = Arc::new(session.extractor(&fetcher));
    let stages = ArtifactStages::new(fetcher.clone(), extractor)
        .preference(fetch.prefer.unwrap_or(session.config.fetch_preference))
        .force(fetch.force);

    let mut pipeline = Pipeline::new();
    pipeline.every_package(stages.download_stage());
    if extract {
        pipeline.every_package(stages.extract_stage());
    }
    pipeline.run(ctx, &StageContext::new())?;

    print_summary(ctx, &fetcher);
    Ok(())
}

fn print_summary(ctx: &BuildContext, fetcher: &Fetcher) {
    let mut shown = std::collections::BTreeSet::new();
    for package in ctx.packages() {
        let Some(artifact) = ctx.registry().artifact_for(&package.name) else {
            continue;
        };
        if !shown.insert(artifact.name.clone()) {
            continue;
        }
        let entry = fetcher
            .locked(&artifact.name, FetchKind::Binary(ctx.platform()))
            .or_else(|| fetcher.locked(&artifact.name, FetchKind::Source));
        match entry {
            Some(entry) => println!(
                "  {:<20} {:<24} {}",
                artifact.name.green(),
                entry.kind().to_string(),
                entry.version.as_deref().unwrap_or("-").dimmed()
            ),
            None => println!("  {:<20} {}", artifact.name, "not downloaded".yellow()),
        }
    }
    println!(
        "{} {} artifacts ready in {}",
        "ok:".green().bold(),
        shown.len(),
        fetcher.directories().downloads.display()
    );
}

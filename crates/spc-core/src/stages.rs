//! Download and extract stages backed by the artifact subsystem

use std::sync::Arc;

use spc_artifact::{Extractor, FetchPreference, Fetcher};
use spc_config::Package;

use crate::build::BuildContext;
use crate::pipeline::{Pipeline, StageDef};
use crate::Result;

pub const DOWNLOAD_STAGE: &str = "download";
pub const EXTRACT_STAGE: &str = "extract";

/// Fetches and extracts the artifact behind each package.
///
/// Packages without an artifact pass through both stages untouched.
/// Packages sharing an artifact fetch it once; later stages hit the lock.
#[derive(Clone)]
pub struct ArtifactStages {
    fetcher: Arc<Fetcher>,
    extractor: Arc<Extractor>,
    preference: FetchPreference,
    force: bool,
}

impl ArtifactStages {
    pub fn new(fetcher: Arc<Fetcher>, extractor: Arc<Extractor>) -> Self {
        Self {
            fetcher,
            extractor,
            preference: FetchPreference::default(),
            force: false,
        }
    }

    pub fn preference(mut self, preference: FetchPreference) -> Self {
        self.preference = preference;
        self
    }

    /// Re-download even when the lock already has an entry.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Stage fetching the package's artifact.
    pub fn download_stage(&self) -> StageDef {
        let stages = self.clone();
        StageDef::new(DOWNLOAD_STAGE, move |ctx, package, _| stages.download(ctx, package))
    }

    /// Stage materialising the fetched artifact.
    pub fn extract_stage(&self) -> StageDef {
        let stages = self.clone();
        StageDef::new(EXTRACT_STAGE, move |ctx, package, _| stages.extract(ctx, package))
    }

    /// Add the download and extract stages ahead of every package's own
    /// stages.
    pub fn install(&self, pipeline: &mut Pipeline) {
        pipeline
            .every_package(self.download_stage())
            .every_package(self.extract_stage());
    }

    fn download(&self, ctx: &BuildContext, package: &Package) -> Result<()> {
        let Some(artifact) = ctx.registry().artifact_for(&package.name) else {
            return Ok(());
        };
        let entry =
            self.fetcher
                .ensure_preferred(artifact, ctx.platform(), self.preference, self.force)?;
        tracing::debug!(
            package = %package.name,
            artifact = %artifact.name,
            kind = %entry.kind(),
            "artifact available"
        );
        Ok(())
    }

    fn extract(&self, ctx: &BuildContext, package: &Package) -> Result<()> {
        let Some(artifact) = ctx.registry().artifact_for(&package.name) else {
            return Ok(());
        };
        // Served from the lock written by the download stage.
        let entry = self
            .fetcher
            .ensure_preferred(artifact, ctx.platform(), self.preference, false)?;
        let outcome = self.extractor.extract(artifact, &entry)?;
        tracing::debug!(package = %package.name, action = ?outcome.action, "extract stage done");
        Ok(())
    }
}

//! Sequential build driver
//!
//! A [`Pipeline`] maps packages to ordered stage definitions and walks the
//! resolved build order, running every stage through
//! [`BuildContext::run_stage`]. Stages declared for every package run
//! first, followed by the stages declared for the package itself or, when
//! there are none, for its kind.

use std::collections::BTreeMap;
use std::sync::Arc;

use spc_config::{Package, PackageKind};

use crate::build::BuildContext;
use crate::context::StageContext;
use crate::error::StageFrame;
use crate::Result;

/// Primary action of a stage
pub type StageAction = Arc<dyn Fn(&BuildContext, &Package, &StageContext) -> Result<()> + Send + Sync>;

/// A named stage and its primary action
#[derive(Clone)]
pub struct StageDef {
    name: String,
    action: StageAction,
}

impl StageDef {
    pub fn new<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(&BuildContext, &Package, &StageContext) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            action: Arc::new(action),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for StageDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StageDef").field(&self.name).finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    common: Vec<StageDef>,
    by_kind: BTreeMap<PackageKind, Vec<StageDef>>,
    by_package: BTreeMap<String, Vec<StageDef>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage run for every package.
    pub fn every_package(&mut self, stage: StageDef) -> &mut Self {
        self.common.push(stage);
        self
    }

    /// Append a stage for packages of `kind` without their own stages.
    pub fn for_kind(&mut self, kind: PackageKind, stage: StageDef) -> &mut Self {
        self.by_kind.entry(kind).or_default().push(stage);
        self
    }

    /// Append a stage for one package.
    pub fn for_package(&mut self, package: impl Into<String>, stage: StageDef) -> &mut Self {
        self.by_package.entry(package.into()).or_default().push(stage);
        self
    }

    /// Stages of `package` in execution order
    pub fn stages_for(&self, package: &Package) -> Vec<&StageDef> {
        let own = self
            .by_package
            .get(&package.name)
            .or_else(|| self.by_kind.get(&package.kind))
            .map(Vec::as_slice)
            .unwrap_or_default();
        self.common.iter().chain(own).collect()
    }

    /// Run every stage of every resolved package, dependencies first.
    ///
    /// Each package sees `base` extended with its name under `"package"`
    /// and the typed [`Package`] record. Returns the completed stages.
    pub fn run(&self, ctx: &BuildContext, base: &StageContext) -> Result<Vec<StageFrame>> {
        let mut completed = Vec::new();
        for package in ctx.packages() {
            ctx.cancel_token().check()?;
            let context = base
                .clone()
                .with("package", package.name.clone())
                .with_typed(package.clone())
                .with_typed(ctx.target().clone());

            for stage in self.stages_for(package) {
                ctx.cancel_token().check()?;
                ctx.run_stage(&package.name, &stage.name, &context, |ctx| {
                    (stage.action)(ctx, package, &context)
                })?;
                completed.push(StageFrame::new(&package.name, &stage.name));
            }
            tracing::info!(package = %package.name, "package stages complete");
        }
        Ok(completed)
    }
}

//! Build context and the stage execution engine

use std::sync::Arc;

use spc_config::{Package, Platform, Registry, SystemTarget};

use crate::cancel::CancelToken;
use crate::context::{HookArgs, StageContext};
use crate::error::StageFrame;
use crate::hooks::{Hook, HookRegistry, Timing};
use crate::resolver::{DependencyResolver, ResolveOptions, Resolution};
use crate::Result;

/// Everything a build run shares: the registry, the resolved package set,
/// the target, registered hooks and the cancellation flag.
#[derive(Debug, Clone)]
pub struct BuildContext {
    registry: Arc<Registry>,
    resolution: Resolution,
    target: SystemTarget,
    hooks: HookRegistry,
    cancel: CancelToken,
}

impl BuildContext {
    pub fn new(registry: Arc<Registry>, resolution: Resolution, target: SystemTarget) -> Self {
        Self {
            registry,
            resolution,
            target,
            hooks: HookRegistry::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Resolve `requested` for `target` and build a context around the
    /// result.
    pub fn resolve<S: AsRef<str>>(
        registry: Arc<Registry>,
        target: SystemTarget,
        requested: &[S],
        options: &ResolveOptions,
    ) -> Result<Self> {
        let resolution = DependencyResolver::new(&registry, target.os()).resolve(requested, options)?;
        tracing::debug!(order = ?resolution.order, "resolved build order");
        for skipped in &resolution.excluded_suggests {
            tracing::info!(
                package = %skipped.package,
                suggested_by = ?skipped.suggested_by,
                "suggested package not selected"
            );
        }
        Ok(Self::new(registry, resolution, target))
    }

    /// Attach hooks after checking their targets against the registry.
    pub fn with_hooks(mut self, hooks: HookRegistry) -> Result<Self> {
        hooks.verify(&self.registry)?;
        self.hooks = hooks;
        Ok(self)
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn target(&self) -> &SystemTarget {
        &self.target
    }

    pub fn platform(&self) -> Platform {
        self.target.platform
    }

    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Resolved packages in build order
    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.resolution
            .order
            .iter()
            .filter_map(|name| self.registry.package(name))
    }

    /// Run one stage of `package`: before hooks, `action`, after hooks.
    ///
    /// Hook parameters are resolved up front, so a hook that cannot be
    /// satisfied fails the stage before any hook or the action runs. The
    /// first failure aborts the stage. Errors leave with this stage added
    /// to their call stack.
    pub fn run_stage<F>(
        &self,
        package: &str,
        stage: &str,
        context: &StageContext,
        action: F,
    ) -> Result<()>
    where
        F: FnOnce(&BuildContext) -> Result<()>,
    {
        self.execute(package, stage, context, action)
            .map_err(|e| e.within(StageFrame::new(package, stage)))
    }

    fn execute<F>(&self, package: &str, stage: &str, context: &StageContext, action: F) -> Result<()>
    where
        F: FnOnce(&BuildContext) -> Result<()>,
    {
        self.cancel.check()?;

        let platform = self.platform();
        let before = self.hooks_with_args(package, stage, Timing::Before, context)?;
        let after = self.hooks_with_args(package, stage, Timing::After, context)?;

        for (hook, args) in &before {
            tracing::debug!(package, stage, module = hook.module(), "running before hook");
            hook.invoke(args)?;
        }

        tracing::debug!(package, stage, %platform, "running stage");
        action(self)?;

        for (hook, args) in &after {
            tracing::debug!(package, stage, module = hook.module(), "running after hook");
            hook.invoke(args)?;
        }
        Ok(())
    }

    fn hooks_with_args<'a>(
        &'a self,
        package: &'a str,
        stage: &'a str,
        timing: Timing,
        context: &StageContext,
    ) -> Result<Vec<(&'a Hook, HookArgs<'a>)>> {
        self.hooks
            .lookup(package, stage, timing, self.platform(), &self.resolution)
            .into_iter()
            .map(|hook| {
                let args = HookArgs::resolve(
                    hook.module(),
                    hook.params(),
                    context,
                    package,
                    stage,
                    self.platform(),
                )?;
                Ok((hook, args))
            })
            .collect()
    }
}

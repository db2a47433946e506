//! Per-invocation state: configuration, registry and collaborators

use std::sync::Arc;

use spc_artifact::{Extractor, Fetcher, HttpTransport, Transport};
use spc_config::{Registry, RegistryLoader, RegistrySource, SystemTarget};
use spc_core::{BuildConfig, BuildContext, CancelToken, ResolveOptions};

use crate::cli::{Cli, FetchArgs, ResolveArgs};
use crate::error::Result;

pub struct Session {
    pub config: BuildConfig,
    cancel: CancelToken,
}

impl Session {
    /// Load the build configuration and apply command-line overrides.
    pub fn open(cli: &Cli, cancel: CancelToken) -> Result<Self> {
        let mut config = match &cli.config {
            Some(path) => BuildConfig::load(path)?,
            None => BuildConfig::discover(&cli.work_dir)?,
        };
        if !cli.registries.is_empty() {
            config.registries = cli.registries.clone();
        }
        tracing::debug!(?config, "build configuration");
        Ok(Self { config, cancel })
    }

    pub fn registry(&self) -> Result<Registry> {
        let sources = self
            .config
            .registries
            .iter()
            .map(|root| RegistrySource::from_root(root))
            .collect::<spc_config::Result<Vec<_>>>()?;
        let registry = RegistryLoader::new()
            .allow_override(self.config.allow_override)
            .load(&sources)?;
        Ok(registry)
    }

    pub fn target(&self, args: &ResolveArgs) -> Result<SystemTarget> {
        Ok(match args.platform {
            Some(platform) => SystemTarget::for_platform(platform),
            None => SystemTarget::current()?,
        })
    }

    /// Resolve the requested packages into a build context.
    pub fn build_context(&self, args: &ResolveArgs) -> Result<BuildContext> {
        let registry = Arc::new(self.registry()?);
        let options = ResolveOptions {
            include_suggested: args.with_suggested || self.config.include_suggested,
            ..Default::default()
        };
        let ctx = BuildContext::resolve(registry, self.target(args)?, &args.packages, &options)?
            .with_cancel(self.cancel.clone());
        Ok(ctx)
    }

    pub fn fetcher(&self, args: &FetchArgs) -> Result<Fetcher> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        self.fetcher_with(transport, args)
    }

    pub fn fetcher_with(&self, transport: Arc<dyn Transport>, args: &FetchArgs) -> Result<Fetcher> {
        let fetcher = Fetcher::new(self.config.directories(), transport)?
            .with_retries(args.retries.unwrap_or(self.config.retries))
            .with_github_token(args.github_token.clone())
            .with_php_version(self.config.php_version.clone());
        Ok(fetcher)
    }

    pub fn extractor(&self, fetcher: &Fetcher) -> Extractor {
        Extractor::new(self.config.directories(), fetcher.transport())
    }
}

//! Build orchestration core for the static PHP builder
//!
//! - [`DependencyResolver`] turns requested packages into a build order.
//! - [`HookRegistry`] collects hooks from [`HookModule`]s.
//! - [`BuildContext::run_stage`] runs one stage with its hooks and
//!   injected parameters; [`Pipeline`] drives every stage of every package.
//!
//! Execution is sequential. A [`CancelToken`] is checked at stage
//! boundaries and surfaces as [`Error::Interrupted`].

pub mod build;
pub mod cancel;
pub mod config;
pub mod context;
pub mod error;
pub mod hooks;
pub mod pipeline;
pub mod process;
pub mod resolver;
pub mod stages;

pub use build::BuildContext;
pub use cancel::CancelToken;
pub use config::BuildConfig;
pub use context::{HookArgs, Param, StageContext};
pub use error::{Error, ErrorKind, Result, StageFrame};
pub use hooks::{Hook, HookModule, HookRegistrar, HookRegistry, HookSpec, Timing};
pub use pipeline::{Pipeline, StageDef};
pub use process::{ProcessOutput, ProcessRunner, SystemRunner};
pub use resolver::{DependencyResolver, ExcludedSuggest, ResolveOptions, Resolution};
pub use stages::ArtifactStages;

//! Package and artifact registry for the static PHP builder
//!
//! Registries are directories of JSON, YAML or TOML files mapping record
//! names to package or artifact declarations. Loading happens in two
//! phases: every file is parsed and structurally validated, then
//! [`Registry::link`] resolves cross-record references at one boundary.

pub mod error;
pub mod fields;
pub mod loader;
pub mod platform;
pub mod registry;
pub mod schema;
pub mod validator;

pub use error::{Error, Result};
pub use loader::{RegistryLoader, RegistrySource};
pub use platform::{Arch, Libc, OsFamily, Platform, SystemTarget};
pub use registry::Registry;
pub use schema::{
    Artifact, ArtifactRef, FetchSpec, License, Package, PackageKind, PhpExtension, ResolvedFields,
    SourceType,
};

//! Filesystem primitives for the static PHP builder
//!
//! Atomic writes guarded by advisory locks, canonical `sha256:<hex>`
//! checksums, format-agnostic config loading and tree copies used by
//! the artifact extractor.

pub mod checksum;
pub mod config;
pub mod copy;
pub mod error;
pub mod io;

pub use config::ConfigStore;
pub use error::{Error, Result};
pub use io::RobustnessConfig;

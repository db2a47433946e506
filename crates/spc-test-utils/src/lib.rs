//! Shared test fixtures for the static PHP builder workspace.
//!
//! Dev-dependency only, never published. Fixtures panic with a message
//! naming the failed step instead of returning errors.
//!
//! # Modules
//!
//! - [`registry`]: temporary registry directories with package/artifact files
//! - [`archive`]: tarballs and zip files with a chosen layout
//! - [`transport`]: in-memory transport that counts calls

pub mod archive;
pub mod registry;
pub mod transport;

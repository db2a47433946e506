//! Working directory layout

use std::path::{Path, PathBuf};

/// Name of the lock file inside the downloads directory
pub const LOCK_FILE: &str = ".lock.json";

/// Directories the fetcher and extractor work in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directories {
    /// Downloaded archives, files and clones
    pub downloads: PathBuf,
    /// Extracted source trees, one per artifact
    pub source: PathBuf,
    /// Install prefix for built libraries and hosted binaries
    pub build_root: PathBuf,
    /// Shared prefix for prebuilt tool packages
    pub pkg_root: PathBuf,
}

impl Directories {
    /// Conventional layout below a working directory.
    pub fn under(root: &Path) -> Self {
        Self {
            downloads: root.join("downloads"),
            source: root.join("source"),
            build_root: root.join("buildroot"),
            pkg_root: root.join("pkgroot"),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.downloads.join(LOCK_FILE)
    }
}

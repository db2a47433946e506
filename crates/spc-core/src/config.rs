//! Build configuration (`spc.toml`)
//!
//! Every key is optional. Relative paths are resolved against the
//! directory holding the config file, or against the working directory
//! when no file is used.
//!
//! ```toml
//! registries = ["config"]
//! downloads = "downloads"
//! retries = 5
//! fetch-preference = "prefer-binary"
//! include-suggested = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spc_artifact::{Directories, FetchPreference};
use spc_fs::ConfigStore;

use crate::{Error, Result};

/// Config file names looked up in a working directory, in order
pub const CONFIG_FILES: &[&str] = &["spc.toml", "spc.yml", "spc.yaml", "spc.json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildConfig {
    /// Registry roots, each holding `packages/` and `artifacts/`
    pub registries: Vec<PathBuf>,
    /// Let later registries replace earlier records of the same name
    pub allow_override: bool,
    pub downloads: PathBuf,
    pub source: PathBuf,
    pub build_root: PathBuf,
    pub pkg_root: PathBuf,
    pub retries: u32,
    pub fetch_preference: FetchPreference,
    pub include_suggested: bool,
    pub php_version: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            registries: vec![PathBuf::from("config")],
            allow_override: false,
            downloads: PathBuf::from("downloads"),
            source: PathBuf::from("source"),
            build_root: PathBuf::from("buildroot"),
            pkg_root: PathBuf::from("pkgroot"),
            retries: spc_artifact::fetcher::DEFAULT_RETRIES,
            fetch_preference: FetchPreference::default(),
            include_suggested: false,
            php_version: "8.4".to_string(),
        }
    }
}

impl BuildConfig {
    /// Load `path` and resolve its relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = ConfigStore::new().load(path)?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        tracing::debug!(path = %path.display(), "loaded build configuration");
        config.validated()?.rebased(base)
    }

    /// Load the first config file found in `dir`, or defaults rooted at
    /// `dir` when there is none.
    pub fn discover(dir: &Path) -> Result<Self> {
        match CONFIG_FILES.iter().map(|name| dir.join(name)).find(|p| p.is_file()) {
            Some(path) => Self::load(&path),
            None => Self::default().rebased(dir),
        }
    }

    fn validated(self) -> Result<Self> {
        if self.registries.is_empty() {
            return Err(Error::InvalidConfig {
                message: "at least one registry path is required".into(),
            });
        }
        if self.php_version.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "php-version must not be empty".into(),
            });
        }
        Ok(self)
    }

    /// Resolve every relative path against `base`.
    pub fn rebased(mut self, base: &Path) -> Result<Self> {
        let rebase = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        self.registries.iter_mut().for_each(rebase);
        for dir in [
            &mut self.downloads,
            &mut self.source,
            &mut self.build_root,
            &mut self.pkg_root,
        ] {
            rebase(dir);
        }
        Ok(self)
    }

    /// Working directory layout described by this config
    pub fn directories(&self) -> Directories {
        Directories {
            downloads: self.downloads.clone(),
            source: self.source.clone(),
            build_root: self.build_root.clone(),
            pkg_root: self.pkg_root.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_rooted_at_dir() {
        let dir = TempDir::new().unwrap();
        let config = BuildConfig::discover(dir.path()).unwrap();

        assert_eq!(config.registries, vec![dir.path().join("config")]);
        assert_eq!(config.directories(), Directories::under(dir.path()));
        assert_eq!(config.retries, spc_artifact::fetcher::DEFAULT_RETRIES);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("spc.toml"),
            "registries = [\"reg\", \"/opt/extra\"]\nretries = 7\nfetch-preference = \"prefer-binary\"\ninclude-suggested = true\n",
        )
        .unwrap();

        let config = BuildConfig::discover(dir.path()).unwrap();

        assert_eq!(
            config.registries,
            vec![dir.path().join("reg"), PathBuf::from("/opt/extra")]
        );
        assert_eq!(config.retries, 7);
        assert_eq!(config.fetch_preference, FetchPreference::PreferBinary);
        assert!(config.include_suggested);
        assert_eq!(config.downloads, dir.path().join("downloads"));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spc.json");
        fs::write(&path, r#"{ "retires": 3 }"#).unwrap();

        let err = BuildConfig::load(&path).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Validation);
    }

    #[test]
    fn test_empty_registry_list_is_invalid() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spc.yml");
        fs::write(&path, "registries: []\n").unwrap();

        let err = BuildConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }
}

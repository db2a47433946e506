//! Loader for package and artifact registries
//!
//! A registry is laid out as:
//!
//! ```text
//! registry/
//!   packages/
//!     lib.json
//!     ext.yml
//!   artifacts/
//!     artifact.json
//! ```
//!
//! Every file maps record names to declarations. Files inside a
//! directory are read in filename order so collisions are reported the
//! same way on every run.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use spc_fs::ConfigStore;

use crate::registry::Registry;
use crate::schema::{Artifact, Package};
use crate::{Error, Result, validator};

/// Where one registry keeps its package and artifact files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySource {
    pub name: String,
    pub packages: Vec<PathBuf>,
    pub artifacts: Vec<PathBuf>,
}

impl RegistrySource {
    /// Use the conventional `packages/` and `artifacts/` sub-directories.
    pub fn from_root(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(Error::MissingPath {
                path: root.to_path_buf(),
            });
        }
        let sub = |dir: &str| {
            let path = root.join(dir);
            if path.exists() { vec![path] } else { Vec::new() }
        };
        Ok(Self {
            name: root
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| root.display().to_string()),
            packages: sub("packages"),
            artifacts: sub("artifacts"),
        })
    }
}

/// Loads and validates registry files
pub struct RegistryLoader {
    store: ConfigStore,
    allow_override: bool,
}

impl RegistryLoader {
    pub fn new() -> Self {
        Self {
            store: ConfigStore::new(),
            allow_override: false,
        }
    }

    /// Let later files redefine names declared by earlier ones.
    pub fn allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    /// Load every source and link the result into a [`Registry`].
    pub fn load(&self, sources: &[RegistrySource]) -> Result<Registry> {
        let package_paths: Vec<PathBuf> = sources.iter().flat_map(|s| s.packages.clone()).collect();
        let artifact_paths: Vec<PathBuf> = sources.iter().flat_map(|s| s.artifacts.clone()).collect();

        let packages = self.load_packages(&package_paths)?;
        let artifacts = self.load_artifacts(&artifact_paths)?;
        tracing::debug!(
            packages = packages.len(),
            artifacts = artifacts.len(),
            "registry files loaded"
        );
        Registry::link(packages, artifacts)
    }

    /// Load package declarations from files or directories.
    pub fn load_packages(&self, paths: &[PathBuf]) -> Result<BTreeMap<String, Package>> {
        self.load_records(paths, "package", validator::package, |p: &Package| {
            p.source_file.clone()
        })
    }

    /// Load artifact declarations from files or directories.
    pub fn load_artifacts(&self, paths: &[PathBuf]) -> Result<BTreeMap<String, Artifact>> {
        self.load_records(paths, "artifact", validator::artifact, |a: &Artifact| {
            a.source_file.clone()
        })
    }

    fn load_records<T>(
        &self,
        paths: &[PathBuf],
        record_kind: &'static str,
        build: fn(&Path, &str, &Value) -> Result<T>,
        origin: fn(&T) -> PathBuf,
    ) -> Result<BTreeMap<String, T>> {
        let mut records: BTreeMap<String, T> = BTreeMap::new();

        for file in expand_paths(paths)? {
            let content: Value = self.store.load(&file)?;
            let Value::Object(entries) = content else {
                return Err(Error::BrokenFile {
                    file,
                    message: "top level must map names to records".into(),
                });
            };

            for (name, value) in &entries {
                let record = build(&file, name, value)?;
                if let Some(existing) = records.get(name) {
                    let first = origin(existing);
                    if !self.allow_override {
                        return Err(Error::DuplicateName {
                            record_kind,
                            name: name.clone(),
                            first,
                            second: file.clone(),
                        });
                    }
                    tracing::warn!(
                        name = %name,
                        first = %first.display(),
                        second = %file.display(),
                        "{record_kind} redefined by a later registry file"
                    );
                }
                records.insert(name.clone(), record);
            }
        }

        Ok(records)
    }
}

impl Default for RegistryLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Expand directories into their config files, sorted by name.
fn expand_paths(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_file() {
            files.push(path.clone());
            continue;
        }
        if !path.is_dir() {
            return Err(Error::MissingPath { path: path.clone() });
        }
        let entries = fs::read_dir(path).map_err(|e| spc_fs::Error::io(path, e))?;
        let mut found: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|p| p.is_file() && ConfigStore::supports(p))
            .collect();
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

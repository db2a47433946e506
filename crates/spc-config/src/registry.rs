//! Linked, read-only view of all packages and artifacts

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;

use crate::schema::{Artifact, ArtifactRef, Package};
use crate::{Error, Result, validator};

/// The merged registry namespace
///
/// Construction goes through [`Registry::link`], which guarantees that
/// every artifact reference and every dependency edge names a known
/// record.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    packages: BTreeMap<String, Package>,
    artifacts: BTreeMap<String, Artifact>,
}

impl Registry {
    /// Resolve cross-record references and build the registry.
    ///
    /// Inline artifacts are registered under their package name.
    pub fn link(
        packages: BTreeMap<String, Package>,
        mut artifacts: BTreeMap<String, Artifact>,
    ) -> Result<Self> {
        for package in packages.values() {
            if let Some(ArtifactRef::Inline(inline)) = &package.artifact {
                if let Some(existing) = artifacts.get(&package.name) {
                    return Err(Error::DuplicateName {
                        record_kind: "artifact",
                        name: package.name.clone(),
                        first: existing.source_file.clone(),
                        second: package.source_file.clone(),
                    });
                }
                let mut artifact = (**inline).clone();
                artifact.name = package.name.clone();
                artifacts.insert(package.name.clone(), artifact);
            }
        }

        for package in packages.values() {
            if let Some(artifact) = package.artifact_name()
                && !artifacts.contains_key(artifact)
            {
                return Err(Error::UnknownArtifact {
                    package: package.name.clone(),
                    artifact: artifact.to_string(),
                });
            }
            for (field, name) in package.references() {
                if !packages.contains_key(name) {
                    return Err(Error::UnresolvedReference {
                        referrer: package.name.clone(),
                        missing: name.to_string(),
                        field: field.to_string(),
                    });
                }
            }
        }

        Ok(Self {
            packages,
            artifacts,
        })
    }

    /// Build a registry from in-memory `name -> record` objects.
    pub fn from_values(packages: &Value, artifacts: &Value) -> Result<Self> {
        let origin = Path::new("<inline>");
        let entries = |value: &Value| -> Result<serde_json::Map<String, Value>> {
            value.as_object().cloned().ok_or_else(|| Error::BrokenFile {
                file: origin.to_path_buf(),
                message: "top level must map names to records".into(),
            })
        };

        let mut pkgs = BTreeMap::new();
        for (name, record) in entries(packages)? {
            pkgs.insert(name.clone(), validator::package(origin, &name, &record)?);
        }
        let mut arts = BTreeMap::new();
        for (name, record) in entries(artifacts)? {
            arts.insert(name.clone(), validator::artifact(origin, &name, &record)?);
        }
        Self::link(pkgs, arts)
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.get(name)
    }

    /// Look up a package, failing with a not-found error.
    pub fn get_package(&self, name: &str) -> Result<&Package> {
        self.package(name).ok_or_else(|| Error::NotFound {
            record_kind: "package",
            name: name.to_string(),
        })
    }

    pub fn artifact(&self, name: &str) -> Option<&Artifact> {
        self.artifacts.get(name)
    }

    /// Look up an artifact, failing with a not-found error.
    pub fn get_artifact(&self, name: &str) -> Result<&Artifact> {
        self.artifact(name).ok_or_else(|| Error::NotFound {
            record_kind: "artifact",
            name: name.to_string(),
        })
    }

    /// The artifact a package builds from
    pub fn artifact_for(&self, package: &str) -> Option<&Artifact> {
        self.package(package)?
            .artifact_name()
            .and_then(|name| self.artifact(name))
    }

    /// Packages that share the given artifact, sorted by name
    pub fn packages_using(&self, artifact: &str) -> Vec<&str> {
        self.packages
            .values()
            .filter(|p| p.artifact_name() == Some(artifact))
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn packages(&self) -> impl Iterator<Item = &Package> {
        self.packages.values()
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Artifact> {
        self.artifacts.values()
    }

    pub fn package_names(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    pub fn contains_package(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }
}

//! Typed package and artifact records
//!
//! Records are produced by [`crate::validator`] after structural checks, so
//! accessors here never fail. Platform-suffixed list fields stay in their
//! raw form and are resolved on demand for a target OS.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::fields;
use crate::platform::{OsFamily, Platform};

/// Kind of a package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PackageKind {
    Library,
    PhpExtension,
    Target,
    VirtualTarget,
}

impl PackageKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "library" => Some(Self::Library),
            "php-extension" => Some(Self::PhpExtension),
            "target" => Some(Self::Target),
            "virtual-target" => Some(Self::VirtualTarget),
            _ => None,
        }
    }

    /// Whether packages of this kind must name an artifact
    pub fn requires_artifact(self) -> bool {
        matches!(self, Self::Library | Self::Target)
    }
}

impl fmt::Display for PackageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Library => write!(f, "library"),
            Self::PhpExtension => write!(f, "php-extension"),
            Self::Target => write!(f, "target"),
            Self::VirtualTarget => write!(f, "virtual-target"),
        }
    }
}

/// License metadata, informational only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum License {
    File { path: String },
    Text { text: String },
}

/// Settings specific to `php-extension` packages
#[derive(Debug, Clone, PartialEq)]
pub struct PhpExtension {
    pub zend_extension: bool,
    pub build_shared: bool,
    pub build_static: bool,
    pub build_with_php: bool,
    pub notes: bool,
    /// Per-OS support status (`yes`, `no`, `partial`, ...)
    pub support: Map<String, Value>,
    raw: Map<String, Value>,
}

impl PhpExtension {
    pub(crate) fn from_map(raw: Map<String, Value>) -> Self {
        let flag = |key: &str, default: bool| raw.get(key).and_then(Value::as_bool).unwrap_or(default);
        Self {
            zend_extension: flag("zend-extension", false),
            build_shared: flag("build-shared", true),
            build_static: flag("build-static", true),
            build_with_php: flag("build-with-php", false),
            notes: flag("notes", false),
            support: raw
                .get("support")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
            raw,
        }
    }

    /// The configure argument style (`enable`, `with`, `custom`, ...)
    pub fn arg_type(&self, os: OsFamily) -> Option<String> {
        fields::resolve_string(&self.raw, "arg-type", os)
    }
}

/// Reference from a package to the artifact providing its material
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactRef {
    Named(String),
    /// Declared inline; registered under the package name at link time
    Inline(Box<Artifact>),
}

impl ArtifactRef {
    pub fn name<'a>(&'a self, package: &'a str) -> &'a str {
        match self {
            Self::Named(name) => name,
            Self::Inline(_) => package,
        }
    }
}

/// Field values resolved for one target OS
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedFields {
    pub depends: Vec<String>,
    pub suggests: Vec<String>,
    pub headers: Vec<String>,
    pub static_libs: Vec<String>,
    pub static_bins: Vec<String>,
    pub frameworks: Vec<String>,
    pub pkg_configs: Vec<String>,
}

/// A named, typed build unit
#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub name: String,
    pub kind: PackageKind,
    pub artifact: Option<ArtifactRef>,
    pub license: Vec<License>,
    pub lang: Option<String>,
    pub php_extension: Option<PhpExtension>,
    pub source_file: PathBuf,
    pub(crate) fields: Map<String, Value>,
}

impl Package {
    /// Raw value of the most specific variant of `base` for `os`
    pub fn field(&self, base: &str, os: OsFamily) -> Option<&Value> {
        fields::resolve_field(&self.fields, base, os)
    }

    pub fn list(&self, base: &str, os: OsFamily) -> Vec<String> {
        fields::resolve_list(&self.fields, base, os)
    }

    pub fn depends(&self, os: OsFamily) -> Vec<String> {
        self.list("depends", os)
    }

    pub fn suggests(&self, os: OsFamily) -> Vec<String> {
        self.list("suggests", os)
    }

    pub fn headers(&self, os: OsFamily) -> Vec<String> {
        self.list("headers", os)
    }

    pub fn static_libs(&self, os: OsFamily) -> Vec<String> {
        self.list("static-libs", os)
    }

    pub fn static_bins(&self, os: OsFamily) -> Vec<String> {
        self.list("static-bins", os)
    }

    /// Name of the artifact this package builds from, if any
    pub fn artifact_name(&self) -> Option<&str> {
        self.artifact.as_ref().map(|a| a.name(&self.name))
    }

    /// All platform-conditional fields resolved for `os`.
    pub fn resolved(&self, os: OsFamily) -> ResolvedFields {
        ResolvedFields {
            depends: self.depends(os),
            suggests: self.suggests(os),
            headers: self.headers(os),
            static_libs: self.static_libs(os),
            static_bins: self.static_bins(os),
            frameworks: self.list("frameworks", os),
            pkg_configs: self.list("pkg-configs", os),
        }
    }

    /// Every `(field key, package name)` edge across all suffix variants.
    pub fn references(&self) -> Vec<(&str, &str)> {
        self.fields
            .iter()
            .filter(|(key, _)| {
                let (base, _) = fields::split_suffix(key);
                base == "depends" || base == "suggests"
            })
            .flat_map(|(key, value)| {
                value
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_str)
                    .map(move |name| (key.as_str(), name))
            })
            .collect()
    }
}

/// Fetch strategy of a source or binary descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceType {
    Url,
    Git,
    GitHubTagTarball,
    GitHubTarball,
    GitHubRelease,
    BitbucketTag,
    FileList,
    Local,
    Pie,
    PhpRelease,
    Custom,
}

impl SourceType {
    /// Parse a strategy name; the short registry spellings are accepted
    /// as aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "url" => Some(Self::Url),
            "git" => Some(Self::Git),
            "github-tag-tarball" | "ghtagtar" => Some(Self::GitHubTagTarball),
            "github-tarball" | "ghtar" => Some(Self::GitHubTarball),
            "github-release" | "ghrel" => Some(Self::GitHubRelease),
            "bitbucket-tag" | "bitbuckettag" => Some(Self::BitbucketTag),
            "file-list-scrape" | "filelist" => Some(Self::FileList),
            "local-path" | "local" => Some(Self::Local),
            "pie" => Some(Self::Pie),
            "php-release" => Some(Self::PhpRelease),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Git => "git",
            Self::GitHubTagTarball => "github-tag-tarball",
            Self::GitHubTarball => "github-tarball",
            Self::GitHubRelease => "github-release",
            Self::BitbucketTag => "bitbucket-tag",
            Self::FileList => "file-list-scrape",
            Self::Local => "local-path",
            Self::Pie => "pie",
            Self::PhpRelease => "php-release",
            Self::Custom => "custom",
        }
    }

    /// Parameters that must be present
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Url => &["url"],
            Self::Git => &["url", "rev"],
            Self::GitHubTagTarball | Self::GitHubTarball => &["repo"],
            Self::GitHubRelease => &["repo", "match"],
            Self::BitbucketTag => &["repo"],
            Self::FileList => &["url", "regex"],
            Self::Local => &["dirname"],
            Self::Pie => &["repo"],
            Self::PhpRelease | Self::Custom => &[],
        }
    }

    /// Whether fetched content is a file a declared `sha256` can be
    /// checked against. Clones and local trees have no single digest.
    pub fn verifies_checksum(self) -> bool {
        !matches!(self, Self::Git | Self::Local)
    }

    /// Parameters that may be present besides `type` and `sha256`
    pub fn optional_params(self) -> &'static [&'static str] {
        match self {
            Self::Url => &["filename", "extract", "version"],
            Self::Git => &["extract", "submodules"],
            Self::GitHubTagTarball | Self::GitHubTarball => &["extract", "prefer-stable", "match"],
            Self::GitHubRelease => &["extract", "prefer-stable"],
            Self::BitbucketTag | Self::Local | Self::Pie | Self::PhpRelease => &["extract"],
            Self::FileList => &["extract", "download-url"],
            Self::Custom => &["func"],
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated fetch-strategy descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct FetchSpec {
    pub source_type: SourceType,
    params: Map<String, Value>,
}

impl FetchSpec {
    pub(crate) fn new(source_type: SourceType, params: Map<String, Value>) -> Self {
        Self {
            source_type,
            params,
        }
    }

    /// Build a descriptor directly; parameters are not validated.
    pub fn from_parts(source_type: SourceType, params: Map<String, Value>) -> Self {
        Self::new(source_type, params)
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn flag(&self, key: &str, default: bool) -> bool {
        self.params
            .get(key)
            .and_then(Value::as_bool)
            .unwrap_or(default)
    }

    /// The raw `extract` setting: a path string or a file map
    pub fn extract(&self) -> Option<&Value> {
        self.params.get("extract")
    }

    /// Declared checksum in canonical `sha256:<hex>` form
    pub fn sha256(&self) -> Option<String> {
        self.param("sha256")
            .and_then(spc_fs::checksum::normalize_checksum)
    }

    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

/// A named description of how to obtain source or prebuilt material
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub name: String,
    pub source: Option<FetchSpec>,
    pub source_mirror: Option<FetchSpec>,
    pub binary: BTreeMap<Platform, FetchSpec>,
    pub binary_mirror: BTreeMap<Platform, FetchSpec>,
    pub metadata: Map<String, Value>,
    pub source_file: PathBuf,
}

impl Artifact {
    pub fn binary_for(&self, platform: Platform) -> Option<&FetchSpec> {
        self.binary.get(&platform)
    }

    pub fn source_file(&self) -> &Path {
        &self.source_file
    }

    /// Sub-directory of the extracted tree that holds the buildable sources
    pub fn source_root(&self) -> Option<&str> {
        self.metadata.get("source-root").and_then(Value::as_str)
    }
}

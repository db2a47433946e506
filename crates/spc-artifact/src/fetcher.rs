//! Idempotent artifact downloads
//!
//! [`Fetcher::ensure`] makes sure one source or binary is present in the
//! downloads directory and recorded in the lock file. A second call with an
//! intact lock entry performs no transport work.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spc_config::{Artifact, FetchSpec, Platform};

use crate::layout::Directories;
use crate::lock::{CacheType, FetchKind, LockEntry, LockFile};
use crate::plan::{FetchPlan, Planner};
use crate::transport::Transport;
use crate::{Error, Result};

/// Default number of extra attempts for network requests
pub const DEFAULT_RETRIES: u32 = 3;

/// Which half of an artifact to fetch when both could serve
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPreference {
    #[default]
    PreferSource,
    PreferBinary,
    SourceOnly,
    BinaryOnly,
}

impl FromStr for FetchPreference {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "prefer-source" => Ok(Self::PreferSource),
            "prefer-binary" | "prefer-pre-built" => Ok(Self::PreferBinary),
            "source-only" => Ok(Self::SourceOnly),
            "binary-only" => Ok(Self::BinaryOnly),
            other => Err(format!(
                "unknown fetch preference '{other}', expected prefer-source, prefer-binary, source-only or binary-only"
            )),
        }
    }
}

impl fmt::Display for FetchPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PreferSource => "prefer-source",
            Self::PreferBinary => "prefer-binary",
            Self::SourceOnly => "source-only",
            Self::BinaryOnly => "binary-only",
        })
    }
}

/// Everything a custom fetch function gets to work with
pub struct CustomRequest<'a> {
    pub artifact: &'a Artifact,
    pub kind: FetchKind,
    pub downloads: &'a Path,
    pub transport: &'a dyn Transport,
    pub retries: u32,
}

/// What a custom fetch function left in the downloads directory
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched {
    pub cache_type: CacheType,
    /// File or directory name relative to the downloads directory
    pub name: String,
    pub version: Option<String>,
    pub metadata: Map<String, Value>,
}

/// Fetch function for artifacts declared with the `custom` strategy
pub type CustomFetch = Box<dyn Fn(&CustomRequest<'_>) -> Result<Fetched> + Send + Sync>;

/// Downloads artifacts and keeps the lock file in step
pub struct Fetcher {
    dirs: Directories,
    transport: Arc<dyn Transport>,
    lock: Mutex<LockFile>,
    custom: BTreeMap<String, CustomFetch>,
    retries: u32,
    github_token: Option<String>,
    php_version: String,
}

impl Fetcher {
    /// Open the lock file under `dirs.downloads` and build a fetcher.
    pub fn new(dirs: Directories, transport: Arc<dyn Transport>) -> Result<Self> {
        let lock = LockFile::open(&dirs.lock_path())?;
        Ok(Self {
            dirs,
            transport,
            lock: Mutex::new(lock),
            custom: BTreeMap::new(),
            retries: DEFAULT_RETRIES,
            github_token: None,
            php_version: "8.4".to_string(),
        })
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Token sent as a bearer header to the GitHub API.
    pub fn with_github_token(mut self, token: Option<String>) -> Self {
        self.github_token = token.filter(|t| !t.is_empty());
        self
    }

    /// PHP release line used by the `php-release` strategy.
    pub fn with_php_version(mut self, version: impl Into<String>) -> Self {
        self.php_version = version.into();
        self
    }

    /// Register the fetch function for a `custom` artifact.
    pub fn register_custom<F>(&mut self, artifact: impl Into<String>, fetch: F)
    where
        F: Fn(&CustomRequest<'_>) -> Result<Fetched> + Send + Sync + 'static,
    {
        self.custom.insert(artifact.into(), Box::new(fetch));
    }

    pub fn directories(&self) -> &Directories {
        &self.dirs
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    fn lock(&self) -> MutexGuard<'_, LockFile> {
        self.lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lock entry for an artifact, if any
    pub fn locked(&self, artifact: &str, kind: FetchKind) -> Option<LockEntry> {
        self.lock().get(artifact, kind).cloned()
    }

    /// Copy of the whole lock file state
    pub fn lock_snapshot(&self) -> LockFile {
        self.lock().clone()
    }

    /// Drop the lock entry of an artifact. Downloaded files are kept.
    pub fn forget(&self, artifact: &str, kind: FetchKind) -> Result<bool> {
        let mut lock = self.lock();
        match kind {
            FetchKind::Source => lock.remove_source(artifact),
            FetchKind::Binary(platform) => lock.remove_binary(artifact, platform),
        }
    }

    /// Make sure the source or a binary of `artifact` is downloaded.
    ///
    /// Returns the existing lock entry when its file or directory is still
    /// present, unless `force` is set. On success the lock file is
    /// rewritten atomically; on failure it is left untouched.
    pub fn ensure(&self, artifact: &Artifact, kind: FetchKind, force: bool) -> Result<LockEntry> {
        let name = artifact.name.as_str();
        let (primary, mirror) = descriptors(artifact, kind)?;

        if !force
            && let Some(entry) = self.locked(name, kind)
            && entry.exists(&self.dirs.downloads)
        {
            tracing::debug!(artifact = name, %kind, "already downloaded");
            return Ok(entry);
        }

        let entry = match self.fetch(artifact, kind, primary) {
            Ok(entry) => entry,
            Err(err) => match mirror {
                Some(mirror) => {
                    tracing::warn!(artifact = name, %kind, error = %err, "fetch failed, trying mirror");
                    self.fetch(artifact, kind, mirror)?
                }
                None => return Err(err),
            },
        };

        self.lock().record(name, entry.clone())?;
        tracing::info!(
            artifact = name,
            %kind,
            version = entry.version.as_deref().unwrap_or("-"),
            "fetched"
        );
        Ok(entry)
    }

    /// Fetch the source or a binary according to `preference`.
    ///
    /// With `PreferBinary`, a failed binary fetch falls back to the source
    /// when one is declared.
    pub fn ensure_preferred(
        &self,
        artifact: &Artifact,
        platform: Platform,
        preference: FetchPreference,
        force: bool,
    ) -> Result<LockEntry> {
        let has_source = artifact.source.is_some();
        let has_binary = artifact.binary.contains_key(&platform);
        let binary = FetchKind::Binary(platform);

        match preference {
            FetchPreference::SourceOnly => self.ensure(artifact, FetchKind::Source, force),
            FetchPreference::BinaryOnly => self.ensure(artifact, binary, force),
            FetchPreference::PreferSource if has_source || !has_binary => {
                self.ensure(artifact, FetchKind::Source, force)
            }
            FetchPreference::PreferSource => self.ensure(artifact, binary, force),
            FetchPreference::PreferBinary if has_binary => match self.ensure(artifact, binary, force) {
                Err(err) if has_source => {
                    tracing::warn!(artifact = %artifact.name, error = %err, "binary fetch failed, using source");
                    self.ensure(artifact, FetchKind::Source, force)
                }
                other => other,
            },
            FetchPreference::PreferBinary => self.ensure(artifact, FetchKind::Source, force),
        }
    }

    fn fetch(&self, artifact: &Artifact, kind: FetchKind, spec: &FetchSpec) -> Result<LockEntry> {
        let name = artifact.name.as_str();
        let plan = Planner::new(self.transport.as_ref(), self.retries)
            .github_token(self.github_token.as_deref())
            .php_version(&self.php_version)
            .plan(artifact, spec)?;

        let entry = |cache_type: CacheType| LockEntry {
            lock_type: kind.lock_type(),
            cache_type,
            filename: None,
            dirname: None,
            source_type: spec.source_type.as_str().to_string(),
            version: None,
            verified: false,
            hash: None,
            extract: spec.extract().cloned(),
            platform: kind.platform(),
            metadata: Map::new(),
            fetched_at: Utc::now(),
        };

        match plan {
            FetchPlan::Download {
                url,
                filename,
                version,
                headers,
                expected_hash,
                mut metadata,
            } => {
                let hash = self.download(name, &url, &filename, &headers, expected_hash.as_deref())?;
                metadata.insert("url".into(), Value::String(url));
                Ok(LockEntry {
                    version,
                    verified: expected_hash.is_some(),
                    hash: Some(hash),
                    metadata,
                    filename: Some(filename.clone()),
                    ..entry(CacheType::for_filename(&filename))
                })
            }
            FetchPlan::Git {
                url,
                rev,
                dirname,
                submodules,
            } => {
                refuse_hash(name, spec, "git clone")?;
                let commit = self.clone_into(&url, &rev, &dirname, submodules)?;

                let mut metadata = Map::new();
                metadata.insert("url".into(), Value::String(url));
                metadata.insert("rev".into(), Value::String(rev.clone()));
                Ok(LockEntry {
                    dirname: Some(dirname),
                    version: Some(rev),
                    hash: Some(commit),
                    metadata,
                    ..entry(CacheType::Git)
                })
            }
            FetchPlan::Local { path } => {
                refuse_hash(name, spec, "local directory")?;
                if !path.is_dir() {
                    return Err(Error::LocalMissing {
                        artifact: name.to_string(),
                        path,
                    });
                }
                let path = spc_fs::copy::canonical(&path)?;
                Ok(LockEntry {
                    dirname: Some(path.to_string_lossy().into_owned()),
                    ..entry(CacheType::Local)
                })
            }
            FetchPlan::Custom => {
                let fetch = self
                    .custom
                    .get(name)
                    .ok_or_else(|| Error::CustomFetcherMissing {
                        artifact: name.to_string(),
                    })?;
                fs::create_dir_all(&self.dirs.downloads)
                    .map_err(|e| Error::io(&self.dirs.downloads, e))?;
                let fetched = fetch(&CustomRequest {
                    artifact,
                    kind,
                    downloads: &self.dirs.downloads,
                    transport: self.transport.as_ref(),
                    retries: self.retries,
                })?;
                self.custom_entry(name, spec, fetched, entry)
            }
        }
    }

    fn custom_entry(
        &self,
        artifact: &str,
        spec: &FetchSpec,
        fetched: Fetched,
        entry: impl Fn(CacheType) -> LockEntry,
    ) -> Result<LockEntry> {
        let path = self.dirs.downloads.join(&fetched.name);
        let base = entry(fetched.cache_type);
        match fetched.cache_type {
            CacheType::Archive | CacheType::File => {
                let hash = spc_fs::checksum::compute_file_checksum(&path)
                    .map_err(|e| Error::io(&path, e))?;
                let expected = spec.sha256();
                if let Some(expected) = &expected
                    && *expected != hash
                {
                    spc_fs::copy::remove_path(&path)?;
                    return Err(Error::ChecksumMismatch {
                        artifact: artifact.to_string(),
                        expected: expected.clone(),
                        actual: hash,
                    });
                }
                Ok(LockEntry {
                    filename: Some(fetched.name),
                    version: fetched.version,
                    verified: expected.is_some(),
                    hash: Some(hash),
                    metadata: fetched.metadata,
                    ..base
                })
            }
            CacheType::Git | CacheType::Local => {
                refuse_hash(artifact, spec, "fetched directory")?;
                Ok(LockEntry {
                    dirname: Some(fetched.name),
                    version: fetched.version,
                    metadata: fetched.metadata,
                    ..base
                })
            }
        }
    }

    /// Clone into a scratch directory next to `dirname` and swap it in
    /// once the clone succeeded, so a failed re-fetch keeps the old tree.
    fn clone_into(&self, url: &str, rev: &str, dirname: &str, submodules: bool) -> Result<String> {
        let downloads = &self.dirs.downloads;
        fs::create_dir_all(downloads).map_err(|e| Error::io(downloads, e))?;
        let dest = downloads.join(dirname);
        let staging = tempfile::Builder::new()
            .prefix(&format!(".{dirname}."))
            .suffix(".part")
            .tempdir_in(downloads)
            .map_err(|e| Error::io(downloads, e))?;
        let scratch = staging.path().join(dirname);

        let commit = self.transport.git_clone(url, rev, &scratch, true, submodules)?;

        spc_fs::copy::remove_path(&dest)?;
        fs::rename(&scratch, &dest).map_err(|e| Error::io(&dest, e))?;
        Ok(commit)
    }

    /// Download into a `.part` file, verify, then move into place.
    fn download(
        &self,
        artifact: &str,
        url: &str,
        filename: &str,
        headers: &[(String, String)],
        expected: Option<&str>,
    ) -> Result<String> {
        let downloads = &self.dirs.downloads;
        fs::create_dir_all(downloads).map_err(|e| Error::io(downloads, e))?;
        let dest = downloads.join(filename);
        let part = downloads.join(format!("{filename}.part"));
        spc_fs::copy::remove_path(&part)?;

        if let Err(err) = self.transport.fetch_url(url, &part, self.retries, headers) {
            let _ = spc_fs::copy::remove_path(&part);
            return Err(err);
        }

        let actual = spc_fs::checksum::compute_file_checksum(&part).map_err(|e| Error::io(&part, e))?;
        if let Some(expected) = expected
            && expected != actual
        {
            spc_fs::copy::remove_path(&part)?;
            return Err(Error::ChecksumMismatch {
                artifact: artifact.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }

        fs::rename(&part, &dest).map_err(|e| Error::io(&dest, e))?;
        Ok(actual)
    }
}

fn refuse_hash(artifact: &str, spec: &FetchSpec, what: &'static str) -> Result<()> {
    match spec.sha256() {
        Some(expected) => Err(Error::Unverifiable {
            artifact: artifact.to_string(),
            expected,
            what,
        }),
        None => Ok(()),
    }
}

fn descriptors(artifact: &Artifact, kind: FetchKind) -> Result<(&FetchSpec, Option<&FetchSpec>)> {
    match kind {
        FetchKind::Source => artifact
            .source
            .as_ref()
            .map(|spec| (spec, artifact.source_mirror.as_ref()))
            .ok_or_else(|| Error::NoSource {
                artifact: artifact.name.clone(),
            }),
        FetchKind::Binary(platform) => artifact
            .binary_for(platform)
            .map(|spec| (spec, artifact.binary_mirror.get(&platform)))
            .ok_or_else(|| Error::NoBinary {
                artifact: artifact.name.clone(),
                platform: platform.to_string(),
            }),
    }
}

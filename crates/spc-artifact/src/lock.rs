//! Persistent record of what has been downloaded
//!
//! The lock file is a single JSON document keyed by artifact name. Each
//! artifact holds at most one source entry and one binary entry per
//! platform:
//!
//! ```json
//! {
//!   "zlib": {
//!     "source": { "lock_type": "source", "cache_type": "archive", ... },
//!     "binary": { "linux-x86_64": { ... } }
//!   }
//! }
//! ```
//!
//! Entries are only written after a fetch has fully succeeded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use spc_config::Platform;
use spc_fs::RobustnessConfig;

use crate::{Error, Result};

/// Which half of an artifact an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchKind {
    Source,
    Binary(Platform),
}

impl FetchKind {
    pub fn lock_type(self) -> LockType {
        match self {
            Self::Source => LockType::Source,
            Self::Binary(_) => LockType::Binary,
        }
    }

    pub fn platform(self) -> Option<Platform> {
        match self {
            Self::Source => None,
            Self::Binary(platform) => Some(platform),
        }
    }
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Binary(platform) => write!(f, "binary {platform}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockType {
    Source,
    Binary,
}

/// How the fetched material is stored under the downloads directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    Archive,
    File,
    Git,
    Local,
}

impl CacheType {
    /// Classify a downloaded file by its name.
    pub fn for_filename(filename: &str) -> Self {
        const ARCHIVES: &[&str] = &[
            ".tar.gz", ".tgz", ".tar.xz", ".txz", ".tar.bz2", ".tbz2", ".tar", ".zip",
        ];
        let lower = filename.to_ascii_lowercase();
        if ARCHIVES.iter().any(|ext| lower.ends_with(ext)) {
            Self::Archive
        } else {
            Self::File
        }
    }
}

/// One fetched source or binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockEntry {
    pub lock_type: LockType,
    pub cache_type: CacheType,
    /// Downloaded file name, relative to the downloads directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    /// Clone directory (relative) or local source path (absolute)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dirname: Option<String>,
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Whether the content was checked against a known hash
    #[serde(default)]
    pub verified: bool,
    /// `sha256:<hex>` for files, the commit id for clones
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extract: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub fetched_at: DateTime<Utc>,
}

impl LockEntry {
    pub fn kind(&self) -> FetchKind {
        match (self.lock_type, self.platform) {
            (LockType::Binary, Some(platform)) => FetchKind::Binary(platform),
            _ => FetchKind::Source,
        }
    }

    /// Where the fetched material lives on disk.
    pub fn path(&self, downloads: &Path) -> Option<PathBuf> {
        self.filename
            .as_deref()
            .or(self.dirname.as_deref())
            .map(|name| downloads.join(name))
    }

    /// Whether the recorded file or directory is still present.
    pub fn exists(&self, downloads: &Path) -> bool {
        self.path(downloads).is_some_and(|p| p.exists())
    }

    /// Identity of the fetched content, used for extraction markers
    pub fn fingerprint(&self) -> String {
        match (&self.hash, &self.dirname) {
            (Some(hash), _) => hash.clone(),
            (None, Some(dir)) => format!("local:{dir}"),
            (None, None) => format!("{}:{}", self.source_type, self.fetched_at.timestamp()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct ArtifactLock {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source: Option<LockEntry>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    binary: BTreeMap<Platform, LockEntry>,
}

impl ArtifactLock {
    fn is_empty(&self) -> bool {
        self.source.is_none() && self.binary.is_empty()
    }
}

/// In-memory view of the lock file plus its location
#[derive(Debug, Clone)]
pub struct LockFile {
    path: PathBuf,
    artifacts: BTreeMap<String, ArtifactLock>,
    robustness: RobustnessConfig,
}

impl LockFile {
    /// Read the lock file, starting empty when it does not exist yet.
    pub fn open(path: &Path) -> Result<Self> {
        let artifacts = match spc_fs::io::read_locked(path)? {
            None => BTreeMap::new(),
            Some(content) if content.trim().is_empty() => BTreeMap::new(),
            Some(content) => serde_json::from_str(&content).map_err(|e| Error::CorruptLock {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?,
        };
        Ok(Self {
            path: path.to_path_buf(),
            artifacts,
            robustness: RobustnessConfig::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, artifact: &str, kind: FetchKind) -> Option<&LockEntry> {
        match kind {
            FetchKind::Source => self.source(artifact),
            FetchKind::Binary(platform) => self.binary(artifact, platform),
        }
    }

    pub fn source(&self, artifact: &str) -> Option<&LockEntry> {
        self.artifacts.get(artifact)?.source.as_ref()
    }

    pub fn binary(&self, artifact: &str, platform: Platform) -> Option<&LockEntry> {
        self.artifacts.get(artifact)?.binary.get(&platform)
    }

    /// Every entry as `(artifact, entry)`, sources before binaries.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &LockEntry)> {
        self.artifacts.iter().flat_map(|(name, lock)| {
            lock.source
                .iter()
                .chain(lock.binary.values())
                .map(move |entry| (name.as_str(), entry))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Persist `entry` for `artifact`.
    ///
    /// The new state is written to disk first and only then becomes
    /// visible in memory, so a failed write leaves both unchanged.
    pub fn record(&mut self, artifact: &str, entry: LockEntry) -> Result<()> {
        let mut next = self.artifacts.clone();
        let slot = next.entry(artifact.to_string()).or_default();
        match entry.kind() {
            FetchKind::Source => slot.source = Some(entry),
            FetchKind::Binary(platform) => {
                slot.binary.insert(platform, entry);
            }
        }
        self.commit(next)
    }

    /// Forget the source entry of `artifact`. Returns whether one existed.
    pub fn remove_source(&mut self, artifact: &str) -> Result<bool> {
        self.remove(artifact, FetchKind::Source)
    }

    /// Forget one binary entry of `artifact`. Returns whether one existed.
    pub fn remove_binary(&mut self, artifact: &str, platform: Platform) -> Result<bool> {
        self.remove(artifact, FetchKind::Binary(platform))
    }

    fn remove(&mut self, artifact: &str, kind: FetchKind) -> Result<bool> {
        let mut next = self.artifacts.clone();
        let Some(slot) = next.get_mut(artifact) else {
            return Ok(false);
        };
        let removed = match kind {
            FetchKind::Source => slot.source.take().is_some(),
            FetchKind::Binary(platform) => slot.binary.remove(&platform).is_some(),
        };
        if !removed {
            return Ok(false);
        }
        if slot.is_empty() {
            next.remove(artifact);
        }
        self.commit(next)?;
        Ok(true)
    }

    fn commit(&mut self, next: BTreeMap<String, ArtifactLock>) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&next).map_err(|e| Error::CorruptLock {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        content.push('\n');
        spc_fs::io::write_atomic(&self.path, content.as_bytes(), self.robustness)?;
        self.artifacts = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spc_config::{Arch, OsFamily};

    fn entry(kind: FetchKind, filename: &str) -> LockEntry {
        LockEntry {
            lock_type: kind.lock_type(),
            cache_type: CacheType::for_filename(filename),
            filename: Some(filename.to_string()),
            dirname: None,
            source_type: "url".into(),
            version: Some("1.3.1".into()),
            verified: false,
            hash: Some(format!("sha256:{}", "0".repeat(64))),
            extract: None,
            platform: kind.platform(),
            metadata: Map::new(),
            fetched_at: Utc::now(),
        }
    }

    #[test]
    fn missing_lock_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let lock = LockFile::open(&dir.path().join(".lock.json")).unwrap();
        assert!(lock.is_empty());
        assert!(!dir.path().join(".lock.json").exists());
    }

    #[test]
    fn recorded_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock.json");
        let linux = Platform::new(OsFamily::Linux, Arch::X86_64);

        let mut lock = LockFile::open(&path).unwrap();
        lock.record("zlib", entry(FetchKind::Source, "zlib-1.3.1.tar.gz"))
            .unwrap();
        lock.record("zlib", entry(FetchKind::Binary(linux), "zlib-linux.tar.gz"))
            .unwrap();

        let reopened = LockFile::open(&path).unwrap();
        assert_eq!(
            reopened.source("zlib").and_then(|e| e.filename.as_deref()),
            Some("zlib-1.3.1.tar.gz")
        );
        assert_eq!(reopened.binary("zlib", linux).map(|e| e.kind()), Some(FetchKind::Binary(linux)));
        assert_eq!(reopened.iter().count(), 2);

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["zlib"]["binary"]["linux-x86_64"]["cache_type"], "archive");
    }

    #[test]
    fn removing_last_entry_drops_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let mut lock = LockFile::open(&dir.path().join(".lock.json")).unwrap();
        lock.record("xz", entry(FetchKind::Source, "xz.tar.xz")).unwrap();

        assert!(lock.remove_source("xz").unwrap());
        assert!(!lock.remove_source("xz").unwrap());
        assert!(lock.is_empty());
    }

    #[test]
    fn corrupt_lock_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".lock.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(LockFile::open(&path), Err(Error::CorruptLock { .. })));
    }

    #[test]
    fn archive_detection_by_extension() {
        assert_eq!(CacheType::for_filename("php-8.4.1.tar.xz"), CacheType::Archive);
        assert_eq!(CacheType::for_filename("apcu.ZIP"), CacheType::Archive);
        assert_eq!(CacheType::for_filename("cacert.pem"), CacheType::File);
    }
}

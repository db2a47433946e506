//! Materialising downloaded artifacts into the working tree
//!
//! Extraction is keyed off the lock entry: the entry's fingerprint is
//! written to a `.spc-hash` marker next to the extracted files, and a
//! later run only re-extracts when the target is missing or the marker no
//! longer matches.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;
use spc_config::Artifact;

use crate::layout::Directories;
use crate::lock::{CacheType, FetchKind, LockEntry, LockFile};
use crate::transport::Transport;
use crate::{Error, Result};

/// Marker file holding the fingerprint of the extracted content
pub const MARKER: &str = ".spc-hash";

/// Where the content of one lock entry goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractTarget {
    /// The whole tree goes into one directory
    Dir(PathBuf),
    /// Selected paths of the tree are copied to individual destinations
    Files(Vec<(String, PathBuf)>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractAction {
    Extracted,
    Linked,
    UpToDate,
}

/// Result of one extraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub target: ExtractTarget,
    pub action: ExtractAction,
}

impl ExtractOutcome {
    /// Whether files were written by this call
    pub fn changed(&self) -> bool {
        self.action != ExtractAction::UpToDate
    }
}

/// Unpacks lock entries into the source, build or package roots
pub struct Extractor {
    dirs: Directories,
    transport: Arc<dyn Transport>,
}

impl Extractor {
    pub fn new(dirs: Directories, transport: Arc<dyn Transport>) -> Self {
        Self { dirs, transport }
    }

    /// Extract the lock entry recorded for `artifact`, failing when it was
    /// never downloaded.
    pub fn extract_locked(
        &self,
        lock: &LockFile,
        artifact: &Artifact,
        kind: FetchKind,
    ) -> Result<ExtractOutcome> {
        let entry = lock
            .get(&artifact.name, kind)
            .ok_or_else(|| Error::NotDownloaded {
                artifact: artifact.name.clone(),
                kind: kind.to_string(),
            })?;
        self.extract(artifact, entry)
    }

    /// Directory holding the buildable sources of `artifact`.
    pub fn source_dir(&self, artifact: &Artifact) -> PathBuf {
        let extract = artifact.source.as_ref().and_then(|s| s.extract());
        let base = match extract {
            Some(Value::String(dir)) => self.resolve(&self.dirs.source, dir),
            _ => self.dirs.source.join(&artifact.name),
        };
        match artifact.source_root() {
            Some(root) => base.join(root),
            None => base,
        }
    }

    /// Where `entry` of `artifact` is materialised.
    pub fn target(&self, artifact: &Artifact, entry: &LockEntry) -> ExtractTarget {
        let binary = entry.kind() != FetchKind::Source;
        let base = if binary {
            &self.dirs.pkg_root
        } else {
            &self.dirs.source
        };
        match &entry.extract {
            Some(Value::String(dir)) if binary && dir == "hosted" => {
                ExtractTarget::Dir(self.dirs.build_root.clone())
            }
            Some(Value::String(dir)) => ExtractTarget::Dir(self.resolve(base, dir)),
            Some(Value::Object(map)) => ExtractTarget::Files(
                map.iter()
                    .filter_map(|(from, to)| Some((from.clone(), self.resolve(base, to.as_str()?))))
                    .collect(),
            ),
            _ if binary => ExtractTarget::Dir(self.dirs.pkg_root.clone()),
            _ => ExtractTarget::Dir(self.dirs.source.join(&artifact.name)),
        }
    }

    fn resolve(&self, base: &Path, dir: &str) -> PathBuf {
        let path = Path::new(dir);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base.join(path)
        }
    }

    /// Marker location; source trees own their directory, everything
    /// else shares a directory and keeps markers per artifact.
    fn marker(&self, artifact: &Artifact, entry: &LockEntry, target: &ExtractTarget) -> PathBuf {
        match (entry.kind(), target) {
            (FetchKind::Source, ExtractTarget::Dir(dir)) => dir.join(MARKER),
            (FetchKind::Source, ExtractTarget::Files(_)) => {
                self.dirs.source.join(MARKER).join(&artifact.name)
            }
            (FetchKind::Binary(platform), _) => self
                .dirs
                .pkg_root
                .join(MARKER)
                .join(format!("{}@{platform}", artifact.name)),
        }
    }

    fn up_to_date(&self, marker: &Path, target: &ExtractTarget, fingerprint: &str) -> bool {
        let present = match target {
            ExtractTarget::Dir(dir) => dir.is_dir(),
            ExtractTarget::Files(files) => files.iter().all(|(_, to)| to.exists()),
        };
        present
            && fs::read_to_string(marker)
                .map(|stored| stored.trim() == fingerprint)
                .unwrap_or(false)
    }

    /// Materialise `entry`, skipping the work when the marker matches.
    pub fn extract(&self, artifact: &Artifact, entry: &LockEntry) -> Result<ExtractOutcome> {
        let downloads = &self.dirs.downloads;
        let origin = entry.path(downloads).ok_or_else(|| Error::NotDownloaded {
            artifact: artifact.name.clone(),
            kind: entry.kind().to_string(),
        })?;
        if !origin.exists() {
            return Err(Error::NotDownloaded {
                artifact: artifact.name.clone(),
                kind: entry.kind().to_string(),
            });
        }

        let target = self.target(artifact, entry);

        if entry.cache_type == CacheType::Local
            && let ExtractTarget::Dir(dir) = &target
            && entry.kind() == FetchKind::Source
        {
            return self.link_local(&origin, dir, target.clone());
        }

        let marker = self.marker(artifact, entry, &target);
        let fingerprint = entry.fingerprint();
        if self.up_to_date(&marker, &target, &fingerprint) {
            tracing::debug!(artifact = %artifact.name, kind = %entry.kind(), "already extracted");
            return Ok(ExtractOutcome {
                target,
                action: ExtractAction::UpToDate,
            });
        }

        match &target {
            ExtractTarget::Dir(dir) => {
                if entry.kind() == FetchKind::Source {
                    spc_fs::copy::remove_path(dir)?;
                }
                self.unpack(entry, &origin, dir)?;
            }
            ExtractTarget::Files(files) => {
                let staging = tempfile::tempdir_in(ensure_dir(&self.dirs.source)?)
                    .map_err(|e| Error::io(&self.dirs.source, e))?;
                self.unpack(entry, &origin, staging.path())?;
                for (from, to) in files {
                    let source = staging.path().join(from);
                    if !source.exists() {
                        return Err(Error::extract(
                            &origin,
                            format!("'{from}' not found in extracted tree"),
                        ));
                    }
                    spc_fs::copy::remove_path(to)?;
                    spc_fs::copy::copy_path(&source, to)?;
                }
            }
        }

        spc_fs::io::write_text(&marker, &fingerprint)?;
        tracing::info!(artifact = %artifact.name, kind = %entry.kind(), "extracted");
        Ok(ExtractOutcome {
            target,
            action: ExtractAction::Extracted,
        })
    }

    fn unpack(&self, entry: &LockEntry, origin: &Path, dest: &Path) -> Result<()> {
        ensure_dir(dest)?;
        match entry.cache_type {
            // Source archives carry a versioned top-level directory.
            CacheType::Archive => {
                let strip = usize::from(entry.kind() == FetchKind::Source);
                self.transport.extract(origin, dest, strip)
            }
            CacheType::File => {
                let name = origin.file_name().unwrap_or_default();
                spc_fs::copy::copy_path(origin, &dest.join(name))?;
                Ok(())
            }
            CacheType::Git => Ok(spc_fs::copy::copy_dir(origin, dest, &[".git"])?),
            CacheType::Local => Ok(spc_fs::copy::copy_dir(origin, dest, &[])?),
        }
    }

    fn link_local(&self, origin: &Path, dir: &Path, target: ExtractTarget) -> Result<ExtractOutcome> {
        if let Ok(existing) = fs::read_link(dir)
            && existing == origin
        {
            return Ok(ExtractOutcome {
                target,
                action: ExtractAction::UpToDate,
            });
        }
        spc_fs::copy::remove_path(dir)?;
        if let Some(parent) = dir.parent() {
            ensure_dir(parent)?;
        }
        match symlink_dir(origin, dir) {
            Ok(()) => Ok(ExtractOutcome {
                target,
                action: ExtractAction::Linked,
            }),
            Err(e) => {
                tracing::debug!(error = %e, dir = %dir.display(), "symlink unavailable, copying");
                spc_fs::copy::copy_dir(origin, dir, &[".git"])?;
                Ok(ExtractOutcome {
                    target,
                    action: ExtractAction::Extracted,
                })
            }
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<&Path> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))?;
    Ok(dir)
}

#[cfg(unix)]
fn symlink_dir(origin: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(origin, link)
}

#[cfg(windows)]
fn symlink_dir(origin: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(origin, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink_dir(_origin: &Path, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::from(std::io::ErrorKind::Unsupported))
}

//! Atomic I/O operations with file locking

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use fs2::FileExt;

use crate::{Error, Result};

/// Retry budget for the final rename of an atomic write.
///
/// Renames can fail transiently when another process (indexers, virus
/// scanners) briefly holds the destination open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobustnessConfig {
    pub initial_interval: Duration,
    pub max_elapsed: Duration,
}

impl Default for RobustnessConfig {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_millis(20),
            max_elapsed: Duration::from_secs(2),
        }
    }
}

/// Write content atomically to a file with locking.
///
/// Uses write-to-temp-then-rename so readers see either the previous
/// content or the new content, never a partial file. The temp file lives
/// in the destination directory to stay on the same filesystem.
pub fn write_atomic(path: &Path, content: &[u8], robustness: RobustnessConfig) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }

    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(&temp_name);

    let mut temp_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&temp_path)
        .map_err(|e| Error::io(&temp_path, e))?;

    temp_file
        .lock_exclusive()
        .map_err(|_| Error::LockFailed { path: path.to_path_buf() })?;

    let written = temp_file
        .write_all(content)
        .and_then(|_| temp_file.sync_all());
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(Error::io(&temp_path, e));
    }

    temp_file
        .unlock()
        .map_err(|_| Error::LockFailed { path: path.to_path_buf() })?;
    drop(temp_file);

    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(robustness.initial_interval)
        .with_max_elapsed_time(Some(robustness.max_elapsed))
        .build();

    let renamed = backoff::retry(policy, || {
        fs::rename(&temp_path, path).map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => {
                tracing::debug!(path = %path.display(), "rename blocked, retrying");
                backoff::Error::transient(e)
            }
            _ => backoff::Error::permanent(e),
        })
    });

    match renamed {
        Ok(()) => Ok(()),
        Err(err) => {
            let _ = fs::remove_file(&temp_path);
            let source = match err {
                backoff::Error::Permanent(e) => e,
                backoff::Error::Transient { err, .. } => err,
            };
            Err(Error::io(path, source))
        }
    }
}

/// Read text content from a file.
pub fn read_text(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| Error::io(path, e))
}

/// Read a file while holding a shared advisory lock.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn read_locked(path: &Path) -> Result<Option<String>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::io(path, e)),
    };
    file.lock_shared()
        .map_err(|_| Error::LockFailed { path: path.to_path_buf() })?;

    // Read through the locked handle to avoid TOCTOU races
    let mut content = String::new();
    (&file)
        .read_to_string(&mut content)
        .map_err(|e| Error::io(path, e))?;
    Ok(Some(content))
}

/// Write text content to a file atomically with default robustness.
pub fn write_text(path: &Path, content: &str) -> Result<()> {
    write_atomic(path, content.as_bytes(), RobustnessConfig::default())
}

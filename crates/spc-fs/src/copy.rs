//! Directory tree helpers used when materialising artifacts

use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Recursively copy `src` into `dst`.
///
/// Entries whose file name appears in `skip` are ignored at every level
/// (used to leave `.git` behind when copying a clone).
pub fn copy_dir(src: &Path, dst: &Path, skip: &[&str]) -> Result<()> {
    fs::create_dir_all(dst).map_err(|e| Error::io(dst, e))?;

    let entries = fs::read_dir(src).map_err(|e| Error::io(src, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| Error::io(src, e))?;
        let name = entry.file_name();
        if skip.iter().any(|s| name == *s) {
            continue;
        }
        let from = entry.path();
        let to = dst.join(&name);
        let file_type = entry.file_type().map_err(|e| Error::io(&from, e))?;

        if file_type.is_dir() {
            copy_dir(&from, &to, skip)?;
        } else {
            fs::copy(&from, &to).map_err(|e| Error::io(&from, e))?;
        }
    }
    Ok(())
}

/// Copy a single file or a whole directory to `dst`, creating parents.
pub fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    if src.is_dir() {
        return copy_dir(src, dst, &[]);
    }
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::copy(src, dst).map_err(|e| Error::io(src, e))?;
    Ok(())
}

/// Remove a file, symlink or directory tree if present.
pub fn remove_path(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(Error::io(path, e)),
    };
    let removed = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|e| Error::io(path, e))
}

/// Canonicalize a path without the Windows `\\?\` prefix.
pub fn canonical(path: &Path) -> Result<PathBuf> {
    dunce::canonicalize(path).map_err(|e| Error::io(path, e))
}

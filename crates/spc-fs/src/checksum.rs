//! SHA-256 checksum utilities
//!
//! A single canonical format (`sha256:<hex>`) is used for lock entries,
//! extraction markers and declared artifact hashes.

use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;

/// Prefix for all checksums produced by this module
const PREFIX: &str = "sha256:";

/// Compute the SHA-256 checksum of string content.
pub fn compute_content_checksum(content: &str) -> String {
    compute_bytes_checksum(content.as_bytes())
}

/// Compute the SHA-256 checksum of raw bytes.
pub fn compute_bytes_checksum(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{}{:x}", PREFIX, hasher.finalize())
}

/// Compute the SHA-256 checksum of a file's contents.
///
/// The file is streamed through the hasher so large archives are not
/// loaded into memory.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn compute_file_checksum(path: &Path) -> std::io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{}{:x}", PREFIX, hasher.finalize()))
}

/// Bring a declared hash into canonical form.
///
/// Accepts either `sha256:<hex>` or a bare hex digest, in any case.
/// Returns `None` for empty input or a foreign algorithm prefix.
pub fn normalize_checksum(declared: &str) -> Option<String> {
    let trimmed = declared.trim();
    let hex = match trimmed.split_once(':') {
        Some((algo, hex)) if algo.eq_ignore_ascii_case("sha256") => hex,
        Some(_) => return None,
        None => trimmed,
    };
    if hex.len() != 64 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("{}{}", PREFIX, hex.to_ascii_lowercase()))
}

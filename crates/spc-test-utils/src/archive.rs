//! Archive fixtures.
//!
//! Every archive wraps its files in a single top-level directory, the way
//! release tarballs do, so extraction with one stripped component yields
//! the files at the destination root.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Create a `.tar.gz` at `path` containing `files` under `top_dir/`.
pub fn tar_gz(path: &Path, top_dir: &str, files: &[(&str, &str)]) {
    let file = File::create(path)
        .unwrap_or_else(|e| panic!("tar_gz: failed to create {}: {e}", path.display()));
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

    for (name, content) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, format!("{top_dir}/{name}"), content.as_bytes())
            .unwrap_or_else(|e| panic!("tar_gz: failed to append {name}: {e}"));
    }

    let encoder = builder
        .into_inner()
        .unwrap_or_else(|e| panic!("tar_gz: failed to finish tar stream: {e}"));
    encoder
        .finish()
        .unwrap_or_else(|e| panic!("tar_gz: failed to finish gzip stream: {e}"));
}

/// Create a `.zip` at `path` containing `files` under `top_dir/`.
pub fn zip(path: &Path, top_dir: &str, files: &[(&str, &str)]) {
    let file = File::create(path)
        .unwrap_or_else(|e| panic!("zip: failed to create {}: {e}", path.display()));
    let mut writer = ::zip::ZipWriter::new(file);
    let options = ::zip::write::SimpleFileOptions::default();

    for (name, content) in files {
        writer
            .start_file(format!("{top_dir}/{name}"), options)
            .unwrap_or_else(|e| panic!("zip: failed to start {name}: {e}"));
        writer
            .write_all(content.as_bytes())
            .unwrap_or_else(|e| panic!("zip: failed to write {name}: {e}"));
    }
    writer
        .finish()
        .unwrap_or_else(|e| panic!("zip: failed to finish archive: {e}"));
}

/// Populate a plain directory tree (for `local-path` artifacts).
pub fn tree(root: &Path, files: &[(&str, &str)]) {
    for (name, content) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .unwrap_or_else(|e| panic!("tree: failed to create {}: {e}", parent.display()));
        }
        fs::write(&path, content)
            .unwrap_or_else(|e| panic!("tree: failed to write {}: {e}", path.display()));
    }
}

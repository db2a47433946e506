//! Network, git and archive access
//!
//! Everything that leaves the process or unpacks foreign data goes through
//! the [`Transport`] trait so the fetcher can be exercised against a fake.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use flate2::read::GzDecoder;

use crate::{Error, Result};

/// Extra request headers as `(name, value)` pairs
pub type Headers = [(String, String)];

/// Collaborator performing downloads, clones and archive extraction
pub trait Transport: Send + Sync {
    /// Download `url` into `dest`, retrying up to `retries` extra times.
    fn fetch_url(&self, url: &str, dest: &Path, retries: u32, headers: &Headers) -> Result<()>;

    /// Fetch a small text document such as a JSON index.
    fn get_text(&self, url: &str, retries: u32, headers: &Headers) -> Result<String>;

    /// Clone `url` at `rev` into `dest` and return the checked out commit id.
    fn git_clone(
        &self,
        url: &str,
        rev: &str,
        dest: &Path,
        shallow: bool,
        submodules: bool,
    ) -> Result<String>;

    /// Unpack `archive` into `dest`, dropping leading path components.
    fn extract(&self, archive: &Path, dest: &Path, strip_components: usize) -> Result<()>;
}

/// Default transport built on reqwest, git2 and the tar/zip readers
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    initial_interval: Duration,
}

impl HttpTransport {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("spc/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(600))
            .build()
            .map_err(|e| Error::Http {
                url: String::new(),
                message: format!("cannot create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            initial_interval: Duration::from_millis(500),
        })
    }

    fn get(
        &self,
        url: &str,
        retries: u32,
        headers: &Headers,
    ) -> Result<reqwest::blocking::Response> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.initial_interval)
            .with_max_elapsed_time(None)
            .build();

        let mut attempt = 0u32;
        let outcome = backoff::retry(policy, || {
            attempt += 1;
            let mut request = self.client.get(url);
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
            let failure = match request.send() {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let permanent =
                        status.is_client_error() && status != reqwest::StatusCode::TOO_MANY_REQUESTS;
                    (format!("HTTP {status}"), permanent)
                }
                Err(e) => (e.to_string(), false),
            };
            let (message, permanent) = failure;
            if permanent || attempt > retries {
                Err(backoff::Error::permanent(message))
            } else {
                tracing::debug!(url, attempt, %message, "request failed, retrying");
                Err(backoff::Error::transient(message))
            }
        });

        outcome.map_err(|err| {
            let message = match err {
                backoff::Error::Permanent(m) => m,
                backoff::Error::Transient { err, .. } => err,
            };
            Error::Http {
                url: url.to_string(),
                message,
            }
        })
    }
}

impl Transport for HttpTransport {
    fn fetch_url(&self, url: &str, dest: &Path, retries: u32, headers: &Headers) -> Result<()> {
        tracing::info!(url, dest = %dest.display(), "downloading");
        let mut response = self.get(url, retries, headers)?;
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut file = File::create(dest).map_err(|e| Error::io(dest, e))?;
        response.copy_to(&mut file).map_err(|e| Error::Http {
            url: url.to_string(),
            message: format!("transfer interrupted: {e}"),
        })?;
        file.sync_all().map_err(|e| Error::io(dest, e))
    }

    fn get_text(&self, url: &str, retries: u32, headers: &Headers) -> Result<String> {
        tracing::debug!(url, "querying index");
        self.get(url, retries, headers)?
            .text()
            .map_err(|e| Error::Http {
                url: url.to_string(),
                message: e.to_string(),
            })
    }

    fn git_clone(
        &self,
        url: &str,
        rev: &str,
        dest: &Path,
        shallow: bool,
        submodules: bool,
    ) -> Result<String> {
        tracing::info!(url, rev, dest = %dest.display(), "cloning");
        let git_err = |e: git2::Error| Error::Git {
            url: url.to_string(),
            rev: rev.to_string(),
            message: e.message().to_string(),
        };

        // Branches and tags can be cloned shallowly; anything else needs
        // the full history to resolve the revision.
        let repo = match clone_ref(url, rev, dest, shallow) {
            Ok(repo) => repo,
            Err(e) => {
                tracing::debug!(url, rev, error = %e.message(), "ref clone failed, cloning full history");
                spc_fs::copy::remove_path(dest)?;
                let repo = git2::Repository::clone(url, dest).map_err(git_err)?;
                checkout_rev(&repo, rev).map_err(git_err)?;
                repo
            }
        };

        if submodules {
            for mut submodule in repo.submodules().map_err(git_err)? {
                submodule.update(true, None).map_err(git_err)?;
            }
        }

        let commit = repo
            .head()
            .and_then(|head| head.peel_to_commit())
            .map_err(git_err)?;
        Ok(commit.id().to_string())
    }

    fn extract(&self, archive: &Path, dest: &Path, strip_components: usize) -> Result<()> {
        extract_archive(archive, dest, strip_components)
    }
}

fn clone_ref(
    url: &str,
    rev: &str,
    dest: &Path,
    shallow: bool,
) -> std::result::Result<git2::Repository, git2::Error> {
    let mut fetch = git2::FetchOptions::new();
    if shallow {
        fetch.depth(1);
    }
    git2::build::RepoBuilder::new()
        .branch(rev)
        .fetch_options(fetch)
        .clone(url, dest)
}

fn checkout_rev(repo: &git2::Repository, rev: &str) -> std::result::Result<(), git2::Error> {
    let object = repo.revparse_single(rev)?;
    repo.checkout_tree(&object, Some(git2::build::CheckoutBuilder::default().force()))?;
    repo.set_head_detached(object.peel_to_commit()?.id())
}

/// Unpack an archive chosen by file extension.
///
/// Gzip, plain tar and zip are read in-process; xz and bzip2 tarballs are
/// handed to the system `tar`.
pub fn extract_archive(archive: &Path, dest: &Path, strip_components: usize) -> Result<()> {
    fs::create_dir_all(dest).map_err(|e| Error::io(dest, e))?;
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    tracing::debug!(archive = %archive.display(), dest = %dest.display(), strip_components, "extracting");
    if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
        unpack_tar(tar::Archive::new(GzDecoder::new(file)), archive, dest, strip_components)
    } else if name.ends_with(".tar") {
        let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
        unpack_tar(tar::Archive::new(file), archive, dest, strip_components)
    } else if name.ends_with(".zip") {
        unpack_zip(archive, dest, strip_components)
    } else if [".tar.xz", ".txz", ".tar.bz2", ".tbz2"]
        .iter()
        .any(|ext| name.ends_with(ext))
    {
        system_tar(archive, dest, strip_components)
    } else {
        Err(Error::extract(archive, "unrecognised archive format"))
    }
}

/// Drop `strip` leading components; rejects absolute and parent paths.
fn stripped(path: &Path, strip: usize) -> Option<PathBuf> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    if parts.len() <= strip {
        return None;
    }
    Some(parts[strip..].iter().collect())
}

fn unpack_tar<R: io::Read>(
    mut tarball: tar::Archive<R>,
    archive: &Path,
    dest: &Path,
    strip: usize,
) -> Result<()> {
    let entries = tarball.entries().map_err(|e| Error::extract(archive, e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| Error::extract(archive, e))?;
        let path = entry.path().map_err(|e| Error::extract(archive, e))?.into_owned();
        let Some(relative) = stripped(&path, strip) else {
            continue;
        };
        let target = dest.join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        entry
            .unpack(&target)
            .map_err(|e| Error::extract(archive, format!("{}: {e}", path.display())))?;
    }
    Ok(())
}

fn unpack_zip(archive: &Path, dest: &Path, strip: usize) -> Result<()> {
    let file = File::open(archive).map_err(|e| Error::io(archive, e))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| Error::extract(archive, e))?;

    for index in 0..zip.len() {
        let mut item = zip.by_index(index).map_err(|e| Error::extract(archive, e))?;
        let Some(path) = item.enclosed_name() else {
            continue;
        };
        let Some(relative) = stripped(&path, strip) else {
            continue;
        };
        let target = dest.join(relative);
        if item.is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io(&target, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| Error::io(&target, e))?;
        io::copy(&mut item, &mut out).map_err(|e| Error::extract(archive, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = item.unix_mode() {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                    .map_err(|e| Error::io(&target, e))?;
            }
        }
    }
    Ok(())
}

fn system_tar(archive: &Path, dest: &Path, strip: usize) -> Result<()> {
    let output = Command::new("tar")
        .arg("-xf")
        .arg(archive)
        .arg("-C")
        .arg(dest)
        .arg(format!("--strip-components={strip}"))
        .output()
        .map_err(|e| Error::extract(archive, format!("cannot run tar: {e}")))?;
    if output.status.success() {
        Ok(())
    } else {
        Err(Error::extract(
            archive,
            String::from_utf8_lossy(&output.stderr).trim(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use spc_test_utils::archive;

    #[test]
    fn tar_gz_is_unpacked_with_top_dir_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let tarball = dir.path().join("zlib-1.3.1.tar.gz");
        archive::tar_gz(&tarball, "zlib-1.3.1", &[("zlib.h", "/* zlib */"), ("src/inflate.c", "int x;")]);

        let out = dir.path().join("out");
        extract_archive(&tarball, &out, 1).unwrap();

        assert_eq!(fs::read_to_string(out.join("zlib.h")).unwrap(), "/* zlib */");
        assert!(out.join("src/inflate.c").is_file());
        assert!(!out.join("zlib-1.3.1").exists());
    }

    #[test]
    fn zip_keeps_layout_without_strip() {
        let dir = tempfile::tempdir().unwrap();
        let zipped = dir.path().join("apcu.zip");
        archive::zip(&zipped, "apcu-5.1", &[("config.m4", "dnl m4")]);

        let out = dir.path().join("out");
        extract_archive(&zipped, &out, 0).unwrap();

        assert!(out.join("apcu-5.1/config.m4").is_file());
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cacert.pem");
        fs::write(&path, "cert").unwrap();
        assert!(matches!(
            extract_archive(&path, &dir.path().join("out"), 1),
            Err(Error::Extract { .. })
        ));
    }

    #[test]
    fn strip_rejects_escaping_paths() {
        assert_eq!(stripped(Path::new("top/a/b.c"), 1), Some(PathBuf::from("a/b.c")));
        assert_eq!(stripped(Path::new("top"), 1), None);
        assert_eq!(stripped(Path::new("top/../etc/passwd"), 1), None);
    }
}

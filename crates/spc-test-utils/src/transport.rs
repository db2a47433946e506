//! [`FakeTransport`]: an in-memory [`Transport`] for fetcher tests.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use spc_artifact::transport::{Headers, Transport, extract_archive};
use spc_artifact::{Error, Result};

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Fetch(String),
    Text(String),
    Clone(String, String),
    Extract(String),
}

#[derive(Default)]
struct State {
    files: HashMap<String, Vec<u8>>,
    texts: HashMap<String, String>,
    repos: HashMap<String, (Vec<(String, String)>, String)>,
    calls: Vec<Call>,
    headers: Vec<(String, Vec<(String, String)>)>,
}

/// Serves registered URLs from memory and records every call.
///
/// Unregistered URLs fail with an HTTP error. Archive extraction uses the
/// real unpacker.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<State>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|e| panic!("FakeTransport: state poisoned: {e}"))
    }

    /// Serve `body` for downloads of `url`.
    pub fn serve(&self, url: &str, body: impl Into<Vec<u8>>) -> &Self {
        self.state().files.insert(url.to_string(), body.into());
        self
    }

    /// Serve the bytes of a file on disk for downloads of `url`.
    pub fn serve_file(&self, url: &str, path: &Path) -> &Self {
        let body = fs::read(path)
            .unwrap_or_else(|e| panic!("serve_file: failed to read {}: {e}", path.display()));
        self.serve(url, body)
    }

    /// Serve `text` for index queries of `url`.
    pub fn serve_text(&self, url: &str, text: &str) -> &Self {
        self.state().texts.insert(url.to_string(), text.to_string());
        self
    }

    /// Serve a repository with `files` at `commit` for clones of `url`.
    pub fn serve_repo(&self, url: &str, files: &[(&str, &str)], commit: &str) -> &Self {
        let files = files
            .iter()
            .map(|(name, content)| (name.to_string(), content.to_string()))
            .collect();
        self.state()
            .repos
            .insert(url.to_string(), (files, commit.to_string()));
        self
    }

    /// Every call made so far, in order
    pub fn calls(&self) -> Vec<Call> {
        self.state().calls.clone()
    }

    /// Number of downloads and clones performed
    pub fn fetch_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|c| matches!(c, Call::Fetch(_) | Call::Clone(..)))
            .count()
    }

    /// Headers sent with the requests to `url`
    pub fn headers_for(&self, url: &str) -> Vec<(String, String)> {
        self.state()
            .headers
            .iter()
            .filter(|(u, _)| u == url)
            .flat_map(|(_, h)| h.clone())
            .collect()
    }

    fn not_found(url: &str) -> Error {
        Error::Http {
            url: url.to_string(),
            message: "HTTP 404 Not Found".to_string(),
        }
    }
}

impl Transport for FakeTransport {
    fn fetch_url(&self, url: &str, dest: &Path, _retries: u32, headers: &Headers) -> Result<()> {
        let mut state = self.state();
        state.calls.push(Call::Fetch(url.to_string()));
        state.headers.push((url.to_string(), headers.to_vec()));
        let body = state.files.get(url).cloned().ok_or_else(|| Self::not_found(url))?;
        drop(state);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        fs::write(dest, body).map_err(|e| Error::io(dest, e))
    }

    fn get_text(&self, url: &str, _retries: u32, headers: &Headers) -> Result<String> {
        let mut state = self.state();
        state.calls.push(Call::Text(url.to_string()));
        state.headers.push((url.to_string(), headers.to_vec()));
        state.texts.get(url).cloned().ok_or_else(|| Self::not_found(url))
    }

    fn git_clone(
        &self,
        url: &str,
        rev: &str,
        dest: &Path,
        _shallow: bool,
        _submodules: bool,
    ) -> Result<String> {
        let mut state = self.state();
        state.calls.push(Call::Clone(url.to_string(), rev.to_string()));
        let (files, commit) = state.repos.get(url).cloned().ok_or_else(|| Error::Git {
            url: url.to_string(),
            rev: rev.to_string(),
            message: "repository not found".to_string(),
        })?;
        drop(state);

        for (name, content) in files.iter().chain([(".git/HEAD".to_string(), commit.clone())].iter()) {
            let path = dest.join(name);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
            }
            fs::write(&path, content).map_err(|e| Error::io(&path, e))?;
        }
        Ok(commit)
    }

    fn extract(&self, archive: &Path, dest: &Path, strip_components: usize) -> Result<()> {
        self.state()
            .calls
            .push(Call::Extract(archive.display().to_string()));
        extract_archive(archive, dest, strip_components)
    }
}

//! Error types for spc-artifact

use std::path::PathBuf;

/// Result type for spc-artifact operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while fetching, locking or extracting artifacts
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request failed after the retry budget was spent
    #[error("Failed to fetch {url}: {message}")]
    Http { url: String, message: String },

    /// Clone or checkout failed
    #[error("Failed to clone {url} at {rev}: {message}")]
    Git {
        url: String,
        rev: String,
        message: String,
    },

    /// Downloaded content does not match the expected hash
    #[error("Checksum mismatch for [{artifact}]: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    /// A hash was declared for content that has no single digest
    #[error("Artifact [{artifact}] declares {expected} but its {what} cannot be checked against a hash")]
    Unverifiable {
        artifact: String,
        expected: String,
        what: &'static str,
    },

    /// An index endpoint answered with something unusable
    #[error("Cannot resolve a download for [{artifact}] from {url}: {message}")]
    Index {
        artifact: String,
        url: String,
        message: String,
    },

    /// The artifact declares no source descriptor
    #[error("Artifact [{artifact}] has no source to fetch")]
    NoSource { artifact: String },

    /// The artifact declares no binary for the requested platform
    #[error("Artifact [{artifact}] has no binary for {platform}")]
    NoBinary { artifact: String, platform: String },

    /// A `custom` strategy has no registered fetch function
    #[error("No custom fetcher registered for artifact [{artifact}]")]
    CustomFetcherMissing { artifact: String },

    /// A `local` strategy points at a missing directory
    #[error("Local source for [{artifact}] not found at {path}")]
    LocalMissing { artifact: String, path: PathBuf },

    /// Extraction requested for something that was never downloaded
    #[error("Artifact [{artifact}] has not been downloaded ({kind})")]
    NotDownloaded { artifact: String, kind: String },

    /// Archive could not be unpacked
    #[error("Failed to extract {archive}: {message}")]
    Extract { archive: PathBuf, message: String },

    /// Lock file exists but cannot be parsed
    #[error("Lock file {path} is corrupt: {message}")]
    CorruptLock { path: PathBuf, message: String },

    /// Filesystem error from spc-fs
    #[error(transparent)]
    Fs(#[from] spc_fs::Error),

    /// Registry error from spc-config
    #[error(transparent)]
    Config(#[from] spc_config::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Fs(spc_fs::Error::io(path, source))
    }

    pub(crate) fn extract(archive: impl Into<PathBuf>, message: impl ToString) -> Self {
        Self::Extract {
            archive: archive.into(),
            message: message.to_string(),
        }
    }

    /// Whether the failure happened on the local filesystem rather than
    /// while talking to a remote.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Fs(spc_fs::Error::Io { .. } | spc_fs::Error::LockFailed { .. })
                | Self::CorruptLock { .. }
        )
    }

    /// The URL or ref a fetch was attempting, when known
    pub fn attempted(&self) -> Option<String> {
        match self {
            Self::Http { url, .. } | Self::Index { url, .. } => Some(url.clone()),
            Self::Git { url, rev, .. } => Some(format!("{url}@{rev}")),
            Self::LocalMissing { path, .. } => Some(path.display().to_string()),
            _ => None,
        }
    }
}

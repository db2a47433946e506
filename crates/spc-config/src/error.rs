//! Error types for spc-config

use std::path::PathBuf;

/// Result type for spc-config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading, validating or querying the registry
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registry path does not exist
    #[error("Registry path not found: {path}")]
    MissingPath { path: PathBuf },

    /// A config file is not a name -> record mapping
    #[error("{file} is broken: {message}")]
    BrokenFile { file: PathBuf, message: String },

    /// A record failed structural validation
    #[error("{record_kind} [{record}] in {file}: {message}")]
    InvalidRecord {
        file: PathBuf,
        record_kind: &'static str,
        record: String,
        message: String,
    },

    /// A record carries a field outside its allowed set
    #[error("{record_kind} [{record}] in {file} has unknown field [{field}]")]
    UnknownField {
        file: PathBuf,
        record_kind: &'static str,
        record: String,
        field: String,
    },

    /// A required field is absent
    #[error("{record_kind} [{record}] in {file} must have a [{field}] field")]
    MissingField {
        file: PathBuf,
        record_kind: &'static str,
        record: String,
        field: String,
    },

    /// The same name is declared twice without the override flag
    #[error("{record_kind} [{name}] is defined in both {first} and {second}")]
    DuplicateName {
        record_kind: &'static str,
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    /// Malformed `os-arch` platform string
    #[error("Invalid platform '{value}': {message}")]
    InvalidPlatform { value: String, message: String },

    /// The running host is not a supported build platform
    #[error("Unsupported host platform {os}/{arch}")]
    UnsupportedHost { os: String, arch: String },

    /// A dependency edge names a package that does not exist
    #[error("Package [{referrer}] references unknown package [{missing}] in [{field}]")]
    UnresolvedReference {
        referrer: String,
        missing: String,
        field: String,
    },

    /// A package names an artifact that does not exist
    #[error("Package [{package}] references unknown artifact [{artifact}]")]
    UnknownArtifact { package: String, artifact: String },

    /// Lookup of a name that is not registered
    #[error("{record_kind} [{name}] not found")]
    NotFound {
        record_kind: &'static str,
        name: String,
    },

    /// Filesystem or parse error from spc-fs
    #[error(transparent)]
    Fs(#[from] spc_fs::Error),
}

impl Error {
    pub(crate) fn invalid(
        file: impl Into<PathBuf>,
        record_kind: &'static str,
        record: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidRecord {
            file: file.into(),
            record_kind,
            record: record.into(),
            message: message.into(),
        }
    }

    pub(crate) fn unknown_field(
        file: impl Into<PathBuf>,
        record_kind: &'static str,
        record: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::UnknownField {
            file: file.into(),
            record_kind,
            record: record.into(),
            field: field.into(),
        }
    }

    pub(crate) fn missing_field(
        file: impl Into<PathBuf>,
        record_kind: &'static str,
        record: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::MissingField {
            file: file.into(),
            record_kind,
            record: record.into(),
            field: field.into(),
        }
    }

    /// Whether this error comes from the filesystem rather than from the
    /// content of the registry.
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Self::Fs(spc_fs::Error::Io { .. } | spc_fs::Error::LockFailed { .. })
        )
    }
}

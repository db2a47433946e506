//! Error types for spc-cli

use spc_core::ErrorKind;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// Errors that can occur in CLI operations
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Error from spc-core
    #[error(transparent)]
    Core(#[from] spc_core::Error),

    /// Standard I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// User-facing error with a message
    #[error("{message}")]
    User { message: String },
}

impl From<spc_config::Error> for CliError {
    fn from(e: spc_config::Error) -> Self {
        Self::Core(e.into())
    }
}

impl From<spc_artifact::Error> for CliError {
    fn from(e: spc_artifact::Error) -> Self {
        Self::Core(e.into())
    }
}

impl CliError {
    /// Create a new user error with the given message
    pub fn user(message: impl Into<String>) -> Self {
        Self::User {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::Io(_) => ErrorKind::Io,
            Self::User { .. } => ErrorKind::Validation,
        }
    }

    /// Process exit code
    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}

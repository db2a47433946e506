//! Error types for spc-core

use std::fmt;

/// Result type for spc-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// One entry of a stage call stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFrame {
    pub package: String,
    pub stage: String,
}

impl StageFrame {
    pub fn new(package: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            stage: stage.into(),
        }
    }
}

impl fmt::Display for StageFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.package, self.stage)
    }
}

/// Classification of an error for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Cycle,
    Stage,
    Fetch,
    Io,
    Internal,
    Interrupted,
}

impl ErrorKind {
    /// Process exit code for this kind
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Validation => 65,
            Self::Cycle => 66,
            Self::Internal => 70,
            Self::Stage => 72,
            Self::Io => 74,
            Self::Fetch => 75,
            Self::Interrupted => 130,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Cycle => "cycle",
            Self::Stage => "stage",
            Self::Fetch => "fetch",
            Self::Io => "io",
            Self::Internal => "internal",
            Self::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}

/// Errors raised while resolving, registering hooks or running stages
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The dependency graph contains a cycle; the chain starts and ends at
    /// the repeated package.
    #[error("Dependency cycle detected: {}", chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    /// A requested or depended-on package is not in the registry
    #[error("{}", unresolved_message(referrer.as_deref(), missing))]
    UnresolvedReference {
        referrer: Option<String>,
        missing: String,
    },

    /// A hook targets a package the registry does not know
    #[error("Hook from module [{module}] targets unknown package [{package}]")]
    UnknownHookTarget { module: String, package: String },

    /// A hook declares a parameter the stage context cannot satisfy
    #[error("Hook from module [{module}] declares parameter [{parameter}: {type_name}] that cannot be injected")]
    UnresolvableParameter {
        module: String,
        parameter: String,
        type_name: &'static str,
    },

    /// Invalid build configuration
    #[error("Invalid build configuration: {message}")]
    InvalidConfig { message: String },

    /// A failure inside one or more nested stages
    #[error("Stage {} failed: {source}", stack.first().map(ToString::to_string).unwrap_or_default())]
    Stage {
        /// Innermost stage first
        stack: Vec<StageFrame>,
        #[source]
        source: Box<Error>,
    },

    /// The build was cancelled
    #[error("Build interrupted by user")]
    Interrupted { stack: Vec<StageFrame> },

    /// A hook or stage action reported a failure
    #[error("{message}")]
    Action { message: String },

    /// An external command exited unsuccessfully
    #[error("Command `{command}` failed with exit code {code}")]
    Process {
        command: String,
        code: i32,
        output: String,
    },

    /// Spawning or waiting on an external command failed
    #[error("Failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Config(#[from] spc_config::Error),

    #[error(transparent)]
    Artifact(#[from] spc_artifact::Error),

    #[error(transparent)]
    Fs(#[from] spc_fs::Error),
}

fn unresolved_message(referrer: Option<&str>, missing: &str) -> String {
    match referrer {
        Some(referrer) => format!("Package [{missing}] required by [{referrer}] not found"),
        None => format!("Package [{missing}] not found"),
    }
}

impl Error {
    /// Failure reported by a hook or stage action.
    pub fn action(message: impl Into<String>) -> Self {
        Self::Action {
            message: message.into(),
        }
    }

    pub(crate) fn interrupted() -> Self {
        Self::Interrupted { stack: Vec::new() }
    }

    /// Classify the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Cycle { .. } => ErrorKind::Cycle,
            Self::UnresolvedReference { .. }
            | Self::UnknownHookTarget { .. }
            | Self::UnresolvableParameter { .. }
            | Self::InvalidConfig { .. } => ErrorKind::Validation,
            Self::Stage { source, .. } if source.kind() == ErrorKind::Interrupted => {
                ErrorKind::Interrupted
            }
            Self::Stage { .. } => ErrorKind::Stage,
            Self::Interrupted { .. } => ErrorKind::Interrupted,
            Self::Action { .. } | Self::Process { .. } | Self::Spawn { .. } => ErrorKind::Stage,
            Self::Config(e) if e.is_io() => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Validation,
            Self::Artifact(e) if e.is_io() => ErrorKind::Io,
            Self::Artifact(_) => ErrorKind::Fetch,
            Self::Fs(spc_fs::Error::Io { .. } | spc_fs::Error::LockFailed { .. }) => ErrorKind::Io,
            Self::Fs(spc_fs::Error::ConfigParse { .. } | spc_fs::Error::UnsupportedFormat { .. }) => {
                ErrorKind::Validation
            }
            Self::Fs(_) => ErrorKind::Internal,
        }
    }

    /// Stage call stack, innermost first; empty outside of any stage.
    pub fn stack(&self) -> &[StageFrame] {
        match self {
            Self::Stage { stack, .. } | Self::Interrupted { stack } => stack,
            _ => &[],
        }
    }

    /// The error with every stage annotation removed.
    pub fn root(&self) -> &Error {
        match self {
            Self::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Add an enclosing stage frame, keeping the frames already collected.
    pub fn within(self, frame: StageFrame) -> Self {
        match self {
            Self::Stage { mut stack, source } => {
                stack.push(frame);
                Self::Stage { stack, source }
            }
            Self::Interrupted { mut stack } => {
                stack.push(frame);
                Self::Interrupted { stack }
            }
            other => Self::Stage {
                stack: vec![frame],
                source: Box::new(other),
            },
        }
    }
}

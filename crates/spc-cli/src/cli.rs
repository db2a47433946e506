//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use spc_artifact::FetchPreference;
use spc_config::Platform;

/// Static PHP builder - resolve, download and extract build dependencies
#[derive(Parser, Debug)]
#[command(name = "spc")]
#[command(
    author,
    version,
    about = "Static PHP builder - resolve, download and extract build dependencies",
    long_about = None
)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Working directory holding spc.toml and the build directories
    #[arg(short = 'C', long, global = true, env = "SPC_WORK_DIR", default_value = ".")]
    pub work_dir: PathBuf,

    /// Build configuration file (default: spc.toml in the working directory)
    #[arg(long, global = true, env = "SPC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Registry root, repeatable; replaces the configured registries
    #[arg(long = "registry", global = true, env = "SPC_REGISTRY", value_delimiter = ',')]
    pub registries: Vec<PathBuf>,

    /// The command to run
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Options shared by commands that resolve packages
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct ResolveArgs {
    /// Packages to resolve, comma separated or repeated
    #[arg(required = true, value_delimiter = ',')]
    pub packages: Vec<String>,

    /// Also resolve suggested packages
    #[arg(long, env = "SPC_WITH_SUGGESTED")]
    pub with_suggested: bool,

    /// Target platform as os-arch (default: the running host)
    #[arg(long, value_parser = parse_platform)]
    pub platform: Option<Platform>,
}

/// Options shared by commands that fetch artifacts
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct FetchArgs {
    /// prefer-source, prefer-binary, source-only or binary-only
    #[arg(long, env = "SPC_FETCH_PREFERENCE")]
    pub prefer: Option<FetchPreference>,

    /// Re-download even when the lock already has an entry
    #[arg(long)]
    pub force: bool,

    /// Retry count for network requests
    #[arg(long, env = "SPC_RETRIES")]
    pub retries: Option<u32>,

    /// Token sent with GitHub API requests
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Load and validate the package and artifact registries
    Validate,

    /// Print the build order for packages
    ///
    /// Examples:
    ///   spc resolve php-cli
    ///   spc resolve php-cli,ext-curl --with-suggested
    ///   spc resolve ext-intl --why --json
    Resolve {
        #[command(flatten)]
        resolve: ResolveArgs,

        /// Show which packages pulled each dependency in
        #[arg(long)]
        why: bool,

        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Download the artifacts of packages and their dependencies
    Download {
        #[command(flatten)]
        resolve: ResolveArgs,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Download and extract the artifacts of packages and their dependencies
    Extract {
        #[command(flatten)]
        resolve: ResolveArgs,

        #[command(flatten)]
        fetch: FetchArgs,
    },

    /// Inspect or edit the download lock
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
}

/// Lock subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum LockAction {
    /// List locked downloads
    List {
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Forget a locked download so the next run fetches it again
    Remove {
        /// Artifact name
        artifact: String,

        /// Remove the binary entry for this platform instead of the source
        #[arg(long, value_parser = parse_platform)]
        binary: Option<Platform>,
    },
}

fn parse_platform(value: &str) -> Result<Platform, String> {
    Platform::parse(value).map_err(|e| e.to_string())
}

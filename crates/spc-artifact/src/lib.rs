//! Artifact fetching, locking and extraction
//!
//! - [`Planner`] turns a registry descriptor into a concrete download,
//!   clone, local path or custom fetch.
//! - [`Fetcher::ensure`] performs the fetch at most once and records it in
//!   the JSON [`LockFile`].
//! - [`Extractor`] materialises lock entries into the working tree.
//!
//! All network, git and archive work goes through the [`Transport`] trait.

pub mod error;
pub mod extract;
pub mod fetcher;
pub mod layout;
pub mod lock;
pub mod plan;
pub mod transport;

pub use error::{Error, Result};
pub use extract::{ExtractAction, ExtractOutcome, ExtractTarget, Extractor};
pub use fetcher::{CustomFetch, CustomRequest, FetchPreference, Fetched, Fetcher};
pub use layout::Directories;
pub use lock::{CacheType, FetchKind, LockEntry, LockFile, LockType};
pub use plan::{FetchPlan, Planner};
pub use transport::{HttpTransport, Transport};

//! Command implementations for spc-cli

pub mod fetch;
pub mod lock;
pub mod resolve;
pub mod validate;

pub use fetch::{run_download, run_extract};
pub use lock::{run_lock_list, run_lock_remove};
pub use resolve::run_resolve;
pub use validate::run_validate;

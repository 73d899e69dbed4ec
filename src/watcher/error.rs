//! Error types for the watch session core.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by session construction.
///
/// Recoverable conditions inside a running session (a directory vanishing
/// mid-walk, a handle going stale, an entry disappearing before it can be
/// stat'ed) are absorbed by the pump and never reach the caller.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize watch session: {reason}")]
    InitFailed { reason: String },

    #[error("Watch target does not exist: {path}")]
    TargetNotFound { path: PathBuf },

    #[error("Cannot watch path {path}: {reason}")]
    PathWatchFailed { path: PathBuf, reason: String },

    #[error("Failed to load config: {reason}")]
    ConfigError { reason: String },
}

impl From<notify::Error> for WatchError {
    fn from(e: notify::Error) -> Self {
        WatchError::InitFailed {
            reason: e.to_string(),
        }
    }
}

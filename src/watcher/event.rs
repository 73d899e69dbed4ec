//! Normalized event model and watch target resolution.

use std::path::{Path, PathBuf};

use super::error::WatchError;
use super::source::RawEventKind;

/// Scope of a watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchMode {
    /// Watch a single file. Its parent directory is registered and events
    /// for every other entry in that directory are filtered out.
    SingleFile,
    /// Watch one directory without descending into subdirectories.
    SingleDirectory,
    /// Watch a directory and every subdirectory, picking up new
    /// subdirectories as they appear.
    Recursive,
}

/// Kind of a normalized change event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Emitted exactly once per session, before any change event, carrying
    /// the registered root directory.
    Initialized,
    /// An entry was created.
    Created,
    /// An entry was modified. Raw kinds without a closer mapping (including
    /// overflow) also land here.
    Modified,
    /// An entry was deleted.
    Deleted,
}

impl From<RawEventKind> for EventKind {
    fn from(raw: RawEventKind) -> Self {
        match raw {
            RawEventKind::Create => EventKind::Created,
            RawEventKind::Remove => EventKind::Deleted,
            RawEventKind::Modify | RawEventKind::Other => EventKind::Modified,
        }
    }
}

/// A normalized change event delivered to session consumers.
///
/// The tag is supplied at session construction and carried on every event
/// without being inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent<T = ()> {
    /// Absolute path of the affected entry.
    pub path: PathBuf,
    pub kind: EventKind,
    /// Whether the entry is a directory, queried at delivery time. When the
    /// entry is already gone, paths that held a directory registration are
    /// reported as directories and everything else as a file.
    pub is_dir: bool,
    pub tag: T,
}

/// A resolved watch target: the canonical path, the directory treated as
/// tree root, and the session mode. Immutable for the session's lifetime.
#[derive(Debug, Clone)]
pub struct WatchTarget {
    path: PathBuf,
    root_dir: PathBuf,
    mode: WatchMode,
}

impl WatchTarget {
    /// Canonicalize `path` and pair it with `mode`, inferring the mode from
    /// the filesystem when none is given: files watch as `SingleFile`,
    /// directories as `Recursive`.
    pub fn resolve(path: &Path, mode: Option<WatchMode>) -> Result<Self, WatchError> {
        let canonical = std::fs::canonicalize(path).map_err(|_| WatchError::TargetNotFound {
            path: path.to_path_buf(),
        })?;
        let is_file = canonical.is_file();

        let mode = mode.unwrap_or(if is_file {
            WatchMode::SingleFile
        } else {
            WatchMode::Recursive
        });

        let root_dir = match mode {
            WatchMode::SingleFile => {
                if !is_file {
                    return Err(WatchError::PathWatchFailed {
                        path: canonical,
                        reason: "single-file mode requires a file target".to_string(),
                    });
                }
                canonical
                    .parent()
                    .ok_or_else(|| WatchError::PathWatchFailed {
                        path: canonical.clone(),
                        reason: "file has no parent directory".to_string(),
                    })?
                    .to_path_buf()
            }
            WatchMode::SingleDirectory | WatchMode::Recursive => {
                if is_file {
                    return Err(WatchError::PathWatchFailed {
                        path: canonical,
                        reason: "directory mode requires a directory target".to_string(),
                    });
                }
                canonical.clone()
            }
        };

        Ok(Self {
            path: canonical,
            root_dir,
            mode,
        })
    }

    /// The canonicalized target path as requested by the caller.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The directory registrations start from: the parent directory for
    /// `SingleFile`, the target itself otherwise.
    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    pub fn mode(&self) -> WatchMode {
        self.mode
    }
}

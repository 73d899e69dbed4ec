//! Watch-tree registrar: owns the set of live directory registrations.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::error::WatchError;
use super::event::{WatchMode, WatchTarget};
use super::source::{EventSource, SourceToken};

/// Tracks which directories of a watch target are currently registered
/// with the event source.
///
/// The registry is owned by one pump task and never shared. Installing a
/// target always cancels every previously held token first and rebuilds the
/// full set; re-registration is a full replace, not an incremental diff.
#[derive(Debug, Default)]
pub struct WatchRegistry {
    tokens: HashMap<SourceToken, PathBuf>,
    dirs: HashSet<PathBuf>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register all directories the target's mode calls for, replacing any
    /// registrations held so far.
    ///
    /// `SingleFile` and `SingleDirectory` register exactly the target's
    /// root directory. `Recursive` walks the tree top-down and registers
    /// every directory; a directory that vanishes between discovery and
    /// registration is skipped without aborting the walk. Fails only when
    /// nothing could be registered at all.
    pub fn install(
        &mut self,
        source: &mut dyn EventSource,
        target: &WatchTarget,
    ) -> Result<(), WatchError> {
        self.clear(source);

        match target.mode() {
            WatchMode::SingleFile | WatchMode::SingleDirectory => {
                let token = source.register(target.root_dir())?;
                self.insert(token, target.root_dir().to_path_buf());
            }
            WatchMode::Recursive => {
                for entry in WalkDir::new(target.root_dir()) {
                    let entry = match entry {
                        Ok(entry) => entry,
                        Err(e) => {
                            crate::debug_event!("registry", "walk skipped", "{e}");
                            continue;
                        }
                    };
                    if !entry.file_type().is_dir() {
                        continue;
                    }
                    match source.register(entry.path()) {
                        Ok(token) => self.insert(token, entry.path().to_path_buf()),
                        Err(e) => {
                            // Vanished between discovery and registration
                            crate::debug_event!(
                                "registry",
                                "register skipped",
                                "{}: {e}",
                                entry.path().display()
                            );
                        }
                    }
                }
                if self.tokens.is_empty() {
                    return Err(WatchError::PathWatchFailed {
                        path: target.root_dir().to_path_buf(),
                        reason: "watch root could not be registered".to_string(),
                    });
                }
            }
        }

        crate::debug_event!("registry", "installed", "{} directories", self.len());
        Ok(())
    }

    /// Cancel every held registration. Idempotent.
    pub fn clear(&mut self, source: &mut dyn EventSource) {
        for (token, _) in self.tokens.drain() {
            source.cancel(token);
        }
        self.dirs.clear();
    }

    /// Whether `path` is one of the currently registered directories.
    ///
    /// Used as the fallback directory test for entries that are already
    /// gone when their event is delivered.
    pub fn covers(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    fn insert(&mut self, token: SourceToken, dir: PathBuf) {
        self.dirs.insert(dir.clone());
        self.tokens.insert(token, dir);
    }
}

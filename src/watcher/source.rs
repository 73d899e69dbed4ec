//! The low-level watch primitive boundary.
//!
//! [`EventSource`] is the seam between the session core and the OS watch
//! facility: register one directory at a time, take batches of raw events,
//! reset or invalidate handles. [`NotifySource`] is the production
//! implementation on top of `notify`, registering every directory
//! individually with `RecursiveMode::NonRecursive` so the registry stays in
//! charge of tree coverage. Tests drive the pump through scripted sources.

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use notify::event::{EventKind as NotifyEventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::error::WatchError;

/// Capacity of the internal queue between the notify callback thread and
/// the pump task.
const RAW_CHANNEL_CAPACITY: usize = 100;

/// Opaque handle for one registered directory.
///
/// Valid from [`EventSource::register`] until cancelled or until the source
/// reports it invalid through [`EventSource::reset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceToken(u64);

impl SourceToken {
    /// Construct a token from a raw id. Sources mint their own ids; this
    /// exists so test doubles can issue tokens too.
    pub fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// Raw event vocabulary at the primitive boundary, before normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawEventKind {
    Create,
    Modify,
    Remove,
    /// Anything the primitive could not classify, overflow included.
    Other,
}

/// One raw event: a kind plus the entry name relative to the watched
/// directory. An empty name refers to the watched directory itself.
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub kind: RawEventKind,
    pub name: PathBuf,
}

/// A group of raw events delivered together for one registered directory.
#[derive(Debug, Clone)]
pub struct EventBatch {
    pub token: SourceToken,
    pub dir: PathBuf,
    pub events: Vec<RawEvent>,
}

/// Interface to the OS watch primitive.
///
/// A source is owned exclusively by one pump task; none of these methods
/// are called concurrently.
#[async_trait]
pub trait EventSource: Send {
    /// Register `dir` for create, modify, and delete notifications.
    fn register(&mut self, dir: &Path) -> Result<SourceToken, WatchError>;

    /// Release a registration. Unknown or already-cancelled tokens are a
    /// no-op.
    fn cancel(&mut self, token: SourceToken);

    /// Wait for the next batch of raw events. Returns `None` once the
    /// source is exhausted and can deliver no further events.
    async fn next_batch(&mut self) -> Option<EventBatch>;

    /// Revalidate a handle after its batch was processed. `false` means the
    /// handle is permanently invalid.
    fn reset(&mut self, token: SourceToken) -> bool;
}

/// `notify`-backed event source.
///
/// The notify callback runs on its own thread and feeds a bounded channel
/// via `blocking_send`; the pump side awaits batches without blocking the
/// runtime.
pub struct NotifySource {
    watcher: RecommendedWatcher,
    raw_rx: mpsc::Receiver<notify::Result<Event>>,
    dirs: HashMap<SourceToken, PathBuf>,
    tokens: HashMap<PathBuf, SourceToken>,
    pending: VecDeque<EventBatch>,
    next_token: u64,
}

impl NotifySource {
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(RAW_CHANNEL_CAPACITY);
        let watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        Ok(Self {
            watcher,
            raw_rx: rx,
            dirs: HashMap::new(),
            tokens: HashMap::new(),
            pending: VecDeque::new(),
            next_token: 0,
        })
    }

    /// Attribute an absolute path to the registration that covers it:
    /// either the path is a registered directory itself, or its parent is.
    fn owner_of(&self, path: &Path) -> Option<(SourceToken, PathBuf)> {
        if let Some(token) = self.tokens.get(path) {
            return Some((*token, path.to_path_buf()));
        }
        let parent = path.parent()?;
        self.tokens
            .get(parent)
            .map(|token| (*token, parent.to_path_buf()))
    }

    /// Convert one notify event into per-directory batches, preserving path
    /// order. Paths that map to no registration are dropped.
    fn convert(&mut self, event: Event) {
        let mut batches: Vec<EventBatch> = Vec::new();

        for (idx, path) in event.paths.iter().enumerate() {
            let kind = match &event.kind {
                NotifyEventKind::Create(_) => RawEventKind::Create,
                NotifyEventKind::Remove(_) => RawEventKind::Remove,
                // Renames surface as a remove of the old name and a create
                // of the new one, matching the rest of the vocabulary.
                NotifyEventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                    RawEventKind::Remove
                }
                NotifyEventKind::Modify(ModifyKind::Name(RenameMode::To)) => RawEventKind::Create,
                NotifyEventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                    if idx == 0 {
                        RawEventKind::Remove
                    } else {
                        RawEventKind::Create
                    }
                }
                NotifyEventKind::Modify(_) => RawEventKind::Modify,
                // Access notifications are outside the create/modify/delete
                // interest set.
                NotifyEventKind::Access(_) => continue,
                NotifyEventKind::Any | NotifyEventKind::Other => RawEventKind::Other,
            };

            let Some((token, dir)) = self.owner_of(path) else {
                crate::debug_event!("source", "unattributed", "{}", path.display());
                continue;
            };

            let name = path.strip_prefix(&dir).unwrap_or(Path::new("")).to_path_buf();
            let raw = RawEvent { kind, name };

            match batches.last_mut() {
                Some(batch) if batch.token == token => batch.events.push(raw),
                _ => batches.push(EventBatch {
                    token,
                    dir,
                    events: vec![raw],
                }),
            }
        }

        self.pending.extend(batches);
    }
}

#[async_trait]
impl EventSource for NotifySource {
    fn register(&mut self, dir: &Path) -> Result<SourceToken, WatchError> {
        if let Some(token) = self.tokens.get(dir) {
            return Ok(*token);
        }
        self.watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            })?;

        self.next_token += 1;
        let token = SourceToken(self.next_token);
        self.dirs.insert(token, dir.to_path_buf());
        self.tokens.insert(dir.to_path_buf(), token);
        Ok(token)
    }

    fn cancel(&mut self, token: SourceToken) {
        if let Some(dir) = self.dirs.remove(&token) {
            self.tokens.remove(&dir);
            // The directory may already be gone; nothing to do about it here
            let _ = self.watcher.unwatch(&dir);
        }
    }

    async fn next_batch(&mut self) -> Option<EventBatch> {
        loop {
            if let Some(batch) = self.pending.pop_front() {
                return Some(batch);
            }
            match self.raw_rx.recv().await? {
                Ok(event) => self.convert(event),
                Err(e) => {
                    tracing::warn!("[source] raw event error: {e}");
                }
            }
        }
    }

    fn reset(&mut self, token: SourceToken) -> bool {
        let live = match self.dirs.get(&token) {
            Some(dir) => dir.is_dir(),
            None => return false,
        };
        if !live {
            self.cancel(token);
        }
        live
    }
}

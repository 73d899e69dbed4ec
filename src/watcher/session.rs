//! Caller-facing watch sessions.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::runtime;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;

use super::error::WatchError;
use super::event::{WatchEvent, WatchMode, WatchTarget};
use super::pump::EventPump;
use super::source::{EventSource, NotifySource};

/// Watch a file or directory with inferred mode and no tag.
///
/// Files are watched in [`WatchMode::SingleFile`], directories in
/// [`WatchMode::Recursive`]. Must be called within a tokio runtime; use
/// [`WatchSession::builder`] to supply one explicitly.
pub fn watch<P: AsRef<Path>>(path: P) -> Result<WatchSession, WatchError> {
    WatchSession::builder(path).build()
}

/// A live watch session: the receiving end of the normalized event stream
/// plus its close control.
///
/// Sessions are closed explicitly with [`close`](Self::close) (idempotent,
/// callable while a [`recv`](Self::recv) is pending) or implicitly on drop.
/// Once closed, `recv` drains any already-published events and then returns
/// `None`.
#[derive(Debug)]
pub struct WatchSession<T = ()> {
    target: WatchTarget,
    tag: T,
    events_rx: mpsc::Receiver<WatchEvent<T>>,
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl WatchSession {
    /// Start configuring a session for `path`.
    pub fn builder<P: AsRef<Path>>(path: P) -> WatchSessionBuilder {
        WatchSessionBuilder {
            path: path.as_ref().to_path_buf(),
            mode: None,
            tag: (),
            channel_capacity: None,
            runtime: None,
            source: None,
        }
    }
}

impl<T> WatchSession<T> {
    /// Receive the next event, suspending until one is available. Returns
    /// `None` once the session is closed and the stream is drained.
    pub async fn recv(&mut self) -> Option<WatchEvent<T>> {
        self.events_rx.recv().await
    }

    /// Request shutdown: the pump stops waiting, cancels every directory
    /// registration, and closes the stream. Idempotent, and safe to race
    /// with the pump's own shutdown on handle invalidation.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    /// A clonable handle for closing this session from another task.
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            shutdown: self.shutdown.clone(),
            closed: self.closed.clone(),
        }
    }

    /// Whether the session has fully shut down.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// The canonicalized path this session watches.
    pub fn path(&self) -> &Path {
        self.target.path()
    }

    pub fn mode(&self) -> WatchMode {
        self.target.mode()
    }

    pub fn tag(&self) -> &T {
        &self.tag
    }
}

impl<T> Drop for WatchSession<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Closes a [`WatchSession`] from any task. Obtained via
/// [`WatchSession::closer`].
#[derive(Clone)]
pub struct SessionCloser {
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
}

impl SessionCloser {
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }
}

/// Builder for [`WatchSession`].
pub struct WatchSessionBuilder<T = ()> {
    path: PathBuf,
    mode: Option<WatchMode>,
    tag: T,
    channel_capacity: Option<usize>,
    runtime: Option<runtime::Handle>,
    source: Option<Box<dyn EventSource>>,
}

impl<T> WatchSessionBuilder<T> {
    /// Set the mode explicitly instead of inferring it from the target.
    pub fn mode(mut self, mode: WatchMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Attach an opaque tag carried on every event of this session.
    pub fn tag<U: Clone + Send + 'static>(self, tag: U) -> WatchSessionBuilder<U> {
        WatchSessionBuilder {
            path: self.path,
            mode: self.mode,
            tag,
            channel_capacity: self.channel_capacity,
            runtime: self.runtime,
            source: self.source,
        }
    }

    /// Capacity of the output channel. A full channel suspends the pump
    /// until the consumer catches up; events are never dropped.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = Some(capacity);
        self
    }

    /// Runtime to spawn the background pump on. Defaults to the ambient
    /// runtime of the constructing task.
    pub fn runtime(mut self, handle: runtime::Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Replace the OS watch primitive, e.g. with a scripted source in tests.
    pub fn source(mut self, source: Box<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Apply defaults from layered [`Settings`].
    pub fn settings(mut self, settings: &Settings) -> Self {
        self.channel_capacity
            .get_or_insert(settings.watcher.channel_capacity);
        self
    }
}

impl<T: Clone + Send + 'static> WatchSessionBuilder<T> {
    /// Resolve the target, create the channel, and spawn the pump.
    ///
    /// Only structural failures surface here: a missing target, a mode that
    /// contradicts the target type, a primitive that cannot be created, or
    /// the absence of a runtime.
    pub fn build(self) -> Result<WatchSession<T>, WatchError> {
        let target = WatchTarget::resolve(&self.path, self.mode)?;

        let source: Box<dyn EventSource> = match self.source {
            Some(source) => source,
            None => Box::new(NotifySource::new()?),
        };

        let runtime = match self.runtime {
            Some(handle) => handle,
            None => runtime::Handle::try_current().map_err(|_| WatchError::InitFailed {
                reason: "no tokio runtime available; provide one with WatchSessionBuilder::runtime"
                    .to_string(),
            })?,
        };

        let capacity = self
            .channel_capacity
            .unwrap_or(crate::config::DEFAULT_CHANNEL_CAPACITY)
            .max(1);
        let (events_tx, events_rx) = mpsc::channel(capacity);
        let shutdown = CancellationToken::new();
        let closed = Arc::new(AtomicBool::new(false));

        let pump = EventPump::new(
            source,
            target.clone(),
            self.tag.clone(),
            events_tx,
            shutdown.clone(),
            closed.clone(),
        );
        runtime.spawn(pump.run());

        Ok(WatchSession {
            target,
            tag: self.tag,
            events_rx,
            shutdown,
            closed,
        })
    }
}

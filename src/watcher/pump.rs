//! Background event pump: drains the source, normalizes, publishes.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::error::WatchError;
use super::event::{EventKind, WatchEvent, WatchMode, WatchTarget};
use super::registry::WatchRegistry;
use super::source::{EventBatch, EventSource};

/// Lifecycle of a pump task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PumpState {
    /// Registrations installed, `Initialized` queued.
    Starting,
    /// Steady-state loop.
    Running,
    /// Shutdown requested or the source gave out; no new wait is started.
    Closing,
    /// Terminal: registrations cancelled, channel closed.
    Closed,
}

/// One pump per session. Owns the source and the registry exclusively;
/// the only state shared with the caller is the `closed` flag and the
/// cancellation token.
pub(crate) struct EventPump<T> {
    source: Box<dyn EventSource>,
    registry: WatchRegistry,
    target: WatchTarget,
    tag: T,
    events_tx: mpsc::Sender<WatchEvent<T>>,
    shutdown: CancellationToken,
    closed: Arc<AtomicBool>,
    state: PumpState,
    rescan_needed: bool,
}

impl<T: Clone + Send + 'static> EventPump<T> {
    pub(crate) fn new(
        source: Box<dyn EventSource>,
        target: WatchTarget,
        tag: T,
        events_tx: mpsc::Sender<WatchEvent<T>>,
        shutdown: CancellationToken,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            registry: WatchRegistry::new(),
            target,
            tag,
            events_tx,
            shutdown,
            closed,
            state: PumpState::Starting,
            rescan_needed: false,
        }
    }

    pub(crate) async fn run(mut self) {
        match self.start().await {
            Ok(()) => self.pump().await,
            Err(e) => {
                tracing::error!(
                    "[pump] session startup failed for {}: {e}",
                    self.target.path().display()
                );
            }
        }
        self.finish();
    }

    /// Install the initial registrations and publish `Initialized`.
    async fn start(&mut self) -> Result<(), WatchError> {
        self.registry
            .install(self.source.as_mut(), &self.target)?;
        crate::log_event!(
            "pump",
            "watching",
            "{} ({} directories)",
            self.target.path().display(),
            self.registry.len()
        );

        let initialized = WatchEvent {
            path: self.target.root_dir().to_path_buf(),
            kind: EventKind::Initialized,
            is_dir: true,
            tag: self.tag.clone(),
        };
        if self.publish(initialized).await {
            self.state = PumpState::Running;
        } else {
            self.state = PumpState::Closing;
        }
        Ok(())
    }

    /// Steady-state loop. Each iteration re-installs registrations if the
    /// previous one saw a structural change, then waits for one batch.
    async fn pump(&mut self) {
        while self.state == PumpState::Running {
            if self.rescan_needed {
                self.rescan_needed = false;
                if let Err(e) = self.registry.install(self.source.as_mut(), &self.target) {
                    crate::debug_event!("pump", "rescan failed", "{e}");
                    self.state = PumpState::Closing;
                    break;
                }
            }

            let batch = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.state = PumpState::Closing;
                    break;
                }
                batch = self.source.next_batch() => match batch {
                    Some(batch) => batch,
                    None => {
                        crate::debug_event!("pump", "source drained");
                        self.state = PumpState::Closing;
                        break;
                    }
                },
            };

            self.process(batch).await;

            if self.closed.load(Ordering::SeqCst) {
                self.state = PumpState::Closing;
            }
        }
    }

    /// Normalize and publish one batch, then revalidate its handle.
    async fn process(&mut self, batch: EventBatch) {
        for raw in &batch.events {
            let path = batch.dir.join(&raw.name);
            let kind = EventKind::from(raw.kind);

            if self.target.mode() == WatchMode::SingleFile && path != self.target.path() {
                continue;
            }

            let is_dir = self.entry_is_dir(&path);
            if self.target.mode() == WatchMode::Recursive
                && is_dir
                && matches!(kind, EventKind::Created | EventKind::Deleted)
            {
                self.rescan_needed = true;
            }

            let event = WatchEvent {
                path,
                kind,
                is_dir,
                tag: self.tag.clone(),
            };
            if !self.publish(event).await {
                self.state = PumpState::Closing;
                return;
            }
        }

        if !self.source.reset(batch.token) {
            if self.shutdown.is_cancelled() || self.closed.load(Ordering::SeqCst) {
                crate::debug_event!("pump", "handle released during shutdown");
            } else {
                tracing::error!(
                    "[pump] watch handle for {} is no longer valid, closing session",
                    batch.dir.display()
                );
            }
            self.state = PumpState::Closing;
        }
    }

    /// Directory test at delivery time. Entries that are already gone fall
    /// back to the registry: paths we held a directory registration for are
    /// directories, everything else is reported as a file.
    fn entry_is_dir(&self, path: &Path) -> bool {
        match std::fs::metadata(path) {
            Ok(meta) => meta.is_dir(),
            Err(_) => self.registry.covers(path),
        }
    }

    /// Publish one event, aborting if the session closes first. Returns
    /// false when the event could not be delivered.
    async fn publish(&mut self, event: WatchEvent<T>) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            sent = self.events_tx.send(event) => sent.is_ok(),
        }
    }

    /// Release every registration and close the channel. Runs exactly once,
    /// whichever signal ended the loop.
    fn finish(&mut self) {
        self.state = PumpState::Closing;
        self.registry.clear(self.source.as_mut());
        self.closed.store(true, Ordering::SeqCst);
        self.state = PumpState::Closed;
        crate::debug_event!("pump", "closed", "{}", self.target.path().display());
    }
}

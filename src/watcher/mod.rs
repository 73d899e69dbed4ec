//! Recursive filesystem watch sessions.
//!
//! A session registers low-level watch handles on every directory of its
//! target, normalizes raw events into a four-kind model, and delivers them
//! through a channel with deterministic shutdown.
//!
//! # Architecture
//!
//! ```text
//! WatchSession<T>
//!   - recv() / close() over an owned mpsc channel
//!         |
//!    EventPump (background task)
//!      - Starting -> Running -> Closing -> Closed
//!      - normalizes batches, decides re-registration
//!         |                        |
//!    WatchRegistry           EventSource
//!      - token set per dir     - notify-backed (NotifySource)
//!      - full-replace rescan   - or a scripted test double
//! ```

mod error;
mod event;
mod pump;
mod registry;
mod session;
mod source;

pub use error::WatchError;
pub use event::{EventKind, WatchEvent, WatchMode, WatchTarget};
pub use registry::WatchRegistry;
pub use session::{SessionCloser, WatchSession, WatchSessionBuilder, watch};
pub use source::{EventBatch, EventSource, NotifySource, RawEvent, RawEventKind, SourceToken};

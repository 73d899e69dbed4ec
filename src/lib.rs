//! watchtree: recursive filesystem watch sessions with normalized events.
//!
//! A [`WatchSession`] observes a file or directory tree and delivers
//! creation, modification, and deletion events as an ordered stream:
//!
//! ```no_run
//! # async fn demo() -> Result<(), watchtree::WatchError> {
//! let mut session = watchtree::watch("./data")?;
//! while let Some(event) = session.recv().await {
//!     println!("{:?} {}", event.kind, event.path.display());
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod logging;
pub mod watcher;

pub use config::Settings;
pub use watcher::{
    EventBatch, EventKind, EventSource, NotifySource, RawEvent, RawEventKind, SessionCloser,
    SourceToken, WatchError, WatchEvent, WatchMode, WatchRegistry, WatchSession,
    WatchSessionBuilder, WatchTarget, watch,
};

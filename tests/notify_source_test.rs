//! End-to-end tests through the notify-backed source against a real
//! filesystem. Raw event timing is platform-dependent, so these tests wait
//! for the events they need and tolerate unrelated churn in between.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tokio::time::{Duration, Instant, sleep, timeout};

use watchtree::{EventKind, WatchEvent, WatchMode, WatchSession, watch};

const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Receive until the expected event shows up, skipping unrelated events.
async fn wait_for<T: std::fmt::Debug>(
    session: &mut WatchSession<T>,
    kind: EventKind,
    path: &Path,
) -> WatchEvent<T> {
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, session.recv()).await {
            Ok(Some(event)) if event.kind == kind && event.path == path => return event,
            Ok(Some(_)) => continue,
            Ok(None) => panic!("stream ended while waiting for {kind:?} {}", path.display()),
            Err(_) => panic!("timed out waiting for {kind:?} {}", path.display()),
        }
    }
}

fn canonical_root(dir: &TempDir) -> PathBuf {
    dir.path().canonicalize().unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_file_in_empty_directory() {
    let dir = TempDir::new().unwrap();
    let root = canonical_root(&dir);
    let mut session = watch(dir.path()).unwrap();
    assert_eq!(session.mode(), WatchMode::Recursive);

    let first = session.recv().await.expect("initialized event");
    assert_eq!(first.kind, EventKind::Initialized);
    assert_eq!(first.path, root);
    assert!(first.is_dir);

    let file = root.join("a.txt");
    fs::write(&file, "hi").unwrap();

    let event = wait_for(&mut session, EventKind::Created, &file).await;
    assert!(!event.is_dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_existing_subdirectories_are_watched() {
    let dir = TempDir::new().unwrap();
    let root = canonical_root(&dir);
    fs::create_dir_all(root.join("a/b")).unwrap();

    let mut session = watch(dir.path()).unwrap();
    session.recv().await.expect("initialized event");

    let file = root.join("a/b/c.txt");
    fs::write(&file, "deep").unwrap();

    let event = wait_for(&mut session, EventKind::Created, &file).await;
    assert!(!event.is_dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_new_subdirectory_is_watched() {
    let dir = TempDir::new().unwrap();
    let root = canonical_root(&dir);
    let mut session = watch(dir.path()).unwrap();
    session.recv().await.expect("initialized event");

    let child = root.join("child");
    fs::create_dir(&child).unwrap();
    let event = wait_for(&mut session, EventKind::Created, &child).await;
    assert!(event.is_dir);

    // Give the structural rescan a moment before writing into the new
    // directory; a racing write can be missed (documented limitation)
    sleep(Duration::from_millis(500)).await;

    let file = child.join("b.txt");
    fs::write(&file, "hi").unwrap();
    let event = wait_for(&mut session, EventKind::Created, &file).await;
    assert!(!event.is_dir);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_file_session_filters_siblings() {
    let dir = TempDir::new().unwrap();
    let root = canonical_root(&dir);
    let file = root.join("f.txt");
    fs::write(&file, "one").unwrap();

    let mut session = watch(&file).unwrap();
    assert_eq!(session.mode(), WatchMode::SingleFile);
    assert_eq!(session.path(), file);

    let first = session.recv().await.expect("initialized event");
    assert_eq!(first.kind, EventKind::Initialized);
    assert_eq!(first.path, root);
    assert!(first.is_dir);

    use std::io::Write;
    let mut f = fs::OpenOptions::new().append(true).open(&file).unwrap();
    writeln!(f, "two").unwrap();
    drop(f);

    let event = wait_for(&mut session, EventKind::Modified, &file).await;
    assert!(!event.is_dir);

    // Drain residual events for the target, then confirm sibling activity
    // stays invisible
    loop {
        match timeout(Duration::from_millis(300), session.recv()).await {
            Ok(Some(event)) => assert_eq!(event.path, file),
            Ok(None) => panic!("stream ended unexpectedly"),
            Err(_) => break,
        }
    }

    fs::write(root.join("other.txt"), "x").unwrap();
    assert!(
        timeout(Duration::from_millis(700), session.recv())
            .await
            .is_err(),
        "sibling events must not pass the single-file filter"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_close_ends_stream_while_recv_pending() {
    let dir = TempDir::new().unwrap();
    let mut session = watch(dir.path()).unwrap();
    session.recv().await.expect("initialized event");

    let closer = session.closer();
    tokio::spawn(async move {
        sleep(Duration::from_millis(100)).await;
        closer.close();
    });

    let ended = timeout(Duration::from_secs(5), session.recv())
        .await
        .expect("close should unblock the pending recv");
    assert!(ended.is_none());
    assert!(session.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tag_is_carried_on_every_event() {
    let dir = TempDir::new().unwrap();
    let root = canonical_root(&dir);
    let mut session = WatchSession::builder(dir.path())
        .tag("deploy")
        .build()
        .unwrap();
    assert_eq!(*session.tag(), "deploy");

    let first = session.recv().await.expect("initialized event");
    assert_eq!(first.tag, "deploy");

    let file = root.join("a.txt");
    fs::write(&file, "hi").unwrap();
    let event = wait_for(&mut session, EventKind::Created, &file).await;
    assert_eq!(event.tag, "deploy");
}

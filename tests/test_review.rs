//! Unit tests for `ReviewStaging`
//!
//! Tests the single-slot overwrite rules and time-based expiry

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use kodegen_agent_session::{
    ExecutionContext, MessageId, PendingReview, ReviewStaging, ScratchWorkspaces, SessionOptions,
};
use tempfile::TempDir;

const TTL: Duration = Duration::from_secs(30 * 60);

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
    staging: ReviewStaging,
}

fn fixture() -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("scratch");
    let options = SessionOptions::builder().scratch_root(&root).build();
    let staging = ReviewStaging::new(ScratchWorkspaces::new(Arc::new(options)), TTL);
    Fixture {
        _dir: dir,
        root,
        staging,
    }
}

fn scratch(root: &Path, name: &str) -> PathBuf {
    let path = root.join(name);
    std::fs::create_dir_all(&path).unwrap();
    std::fs::write(path.join("main.rs"), "fn main() {}\n").unwrap();
    path
}

/// Wait for a background teardown to remove `path`
async fn removed(path: &Path) -> bool {
    for _ in 0..200 {
        if !path.exists() {
            return true;
        }
        tokio::task::yield_now().await;
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

fn review(scratch_path: &Path, should_cleanup: bool) -> PendingReview {
    PendingReview {
        scratch_path: scratch_path.to_path_buf(),
        modified_files: vec!["main.rs".to_string()],
        execution: ExecutionContext::project("/tmp/project"),
        projects: Vec::new(),
        should_cleanup,
        created_at: tokio::time::Instant::now(),
        message_id: MessageId::generate(),
    }
}

#[tokio::test]
async fn test_set_then_get() {
    let f = fixture();
    let a = scratch(&f.root, "a");

    assert!(f.staging.get().is_none());
    f.staging.set(review(&a, true)).await;

    let pending = f.staging.get().unwrap();
    assert_eq!(pending.scratch_path, a);
    assert_eq!(pending.modified_files, vec!["main.rs".to_string()]);
}

#[tokio::test]
async fn test_overwrite_tears_down_previous_scratch() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    let b = scratch(&f.root, "b");

    f.staging.set(review(&a, true)).await;
    f.staging.set(review(&b, true)).await;

    assert_eq!(f.staging.get().unwrap().scratch_path, b);
    assert!(!a.exists());
    assert!(b.exists());
}

#[tokio::test]
async fn test_overwrite_with_same_scratch_keeps_it() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    let first = review(&a, true);
    let second = review(&a, true);
    let second_id = second.message_id.clone();

    f.staging.set(first).await;
    f.staging.set(second).await;

    assert!(a.exists());
    assert_eq!(f.staging.get().unwrap().message_id, second_id);
}

#[tokio::test]
async fn test_overwrite_without_cleanup_keeps_previous_scratch() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    let b = scratch(&f.root, "b");

    f.staging.set(review(&a, false)).await;
    f.staging.set(review(&b, true)).await;

    assert!(a.exists());
}

#[tokio::test(start_paused = true)]
async fn test_record_expires_after_ttl() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    f.staging.set(review(&a, true)).await;

    tokio::time::advance(Duration::from_secs(29 * 60)).await;
    assert!(f.staging.get().is_some());
    assert!(a.exists());

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    assert!(f.staging.get().is_none());
    assert!(removed(&a).await);
}

#[tokio::test(start_paused = true)]
async fn test_record_at_exact_ttl_is_kept() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    f.staging.set(review(&a, true)).await;

    tokio::time::advance(TTL).await;
    assert!(f.staging.get().is_some());
    assert!(a.exists());

    tokio::time::advance(Duration::from_millis(1)).await;
    assert!(f.staging.get().is_none());
    assert!(removed(&a).await);
}

#[tokio::test(start_paused = true)]
async fn test_sweep_expires_without_get() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    f.staging.set(review(&a, true)).await;
    tokio::task::yield_now().await;

    tokio::time::advance(Duration::from_secs(31 * 60)).await;
    assert!(removed(&a).await);
    assert!(f.staging.get().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_replacing_record_restarts_expiry() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    let b = scratch(&f.root, "b");

    f.staging.set(review(&a, true)).await;
    tokio::time::advance(Duration::from_secs(20 * 60)).await;
    f.staging.set(review(&b, true)).await;
    tokio::time::advance(Duration::from_secs(20 * 60)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    assert_eq!(f.staging.get().unwrap().scratch_path, b);
    assert!(b.exists());
}

#[tokio::test]
async fn test_clear_keeps_scratch() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    f.staging.set(review(&a, true)).await;

    f.staging.clear();

    assert!(f.staging.get().is_none());
    assert!(a.exists());
}

#[tokio::test]
async fn test_deactivate_tears_down_scratch() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    f.staging.set(review(&a, true)).await;

    f.staging.on_deactivate().await;

    assert!(f.staging.get().is_none());
    assert!(!a.exists());
}

#[tokio::test]
async fn test_deactivate_respects_cleanup_flag() {
    let f = fixture();
    let a = scratch(&f.root, "a");
    f.staging.set(review(&a, false)).await;

    f.staging.on_deactivate().await;

    assert!(f.staging.get().is_none());
    assert!(a.exists());
}

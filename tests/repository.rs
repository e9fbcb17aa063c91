//! Repository Integration Tests
//!
//! Tests sync, commit/push outcomes and the transaction retry loop against
//! a real bare remote.

mod common;

use std::cell::Cell;
use std::path::PathBuf;

use common::{fast_retry, git, push_file, Remote};
use sttq::core::{Mutation, PushOutcome, QueueError};

#[tokio::test]
async fn test_sync_is_idempotent() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;

    repo.sync().await.unwrap();
    let first = repo.tree_hash().await.unwrap();
    repo.sync().await.unwrap();
    let second = repo.tree_hash().await.unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_sync_discards_local_drift() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;
    let workdir = repo.workdir().to_path_buf();

    std::fs::write(workdir.join("README"), "edited locally\n").unwrap();
    std::fs::create_dir_all(workdir.join("to_stt")).unwrap();
    std::fs::write(workdir.join("to_stt/stray.txt"), "stray\n").unwrap();

    repo.sync().await.unwrap();

    assert_eq!(std::fs::read_to_string(workdir.join("README")).unwrap(), "queue\n");
    assert!(!workdir.join("to_stt/stray.txt").exists());
}

#[tokio::test]
async fn test_sync_picks_up_remote_changes() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;
    let other = remote.clone_as("producer");

    push_file(&other, "to_stt/batch.txt", "line\n");
    repo.sync().await.unwrap();

    assert!(repo.inbox().join("batch.txt").exists());
}

#[tokio::test]
async fn test_nothing_to_commit() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;
    let head = repo.head().await.unwrap();

    let outcome = repo
        .commit_and_push(&[repo.workdir().join("README")], "noop")
        .await
        .unwrap();

    assert_eq!(outcome, PushOutcome::NothingToCommit);
    assert_eq!(repo.head().await.unwrap(), head);
    assert_eq!(remote.commit_count(), 1);
}

#[tokio::test]
async fn test_missing_untracked_paths_are_skipped() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;

    let outcome = repo
        .commit_and_push(&[repo.inbox().join("never-existed.txt")], "noop")
        .await
        .unwrap();
    assert_eq!(outcome, PushOutcome::NothingToCommit);
}

#[tokio::test]
async fn test_commit_includes_untracked_files() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;

    std::fs::create_dir_all(repo.outbox()).unwrap();
    std::fs::write(repo.outbox().join("[x][y][标题][BV1].srt"), "1\n").unwrap();

    let outcome = repo.commit_and_push(&[], "upload 1 processed files").await.unwrap();
    assert!(matches!(outcome, PushOutcome::Committed { .. }));
    assert_eq!(remote.commit_count(), 2);

    let listed = git(&remote.bare, &["ls-tree", "-r", "--name-only", "-z", "main"]);
    assert!(listed.contains("[x][y][标题][BV1].srt"));
}

#[tokio::test]
async fn test_rejected_push_then_sync_leaves_one_commit() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;
    let other = remote.clone_as("producer");

    // another writer moves first
    push_file(&other, "to_stt/a.txt", "a\n");

    let path = repo.inbox().join("b.txt");
    std::fs::create_dir_all(repo.inbox()).unwrap();
    std::fs::write(&path, "b\n").unwrap();
    let outcome = repo.commit_and_push(&[path.clone()], "add b").await.unwrap();
    assert!(matches!(outcome, PushOutcome::PushRejected { .. }));

    // the reset discards the local commit; redo the work from scratch
    repo.sync().await.unwrap();
    assert!(!path.exists());
    std::fs::write(&path, "b\n").unwrap();
    let outcome = repo.commit_and_push(&[path.clone()], "add b").await.unwrap();
    assert!(matches!(outcome, PushOutcome::Committed { .. }));

    assert_eq!(remote.commit_count(), 3);
    let subjects = git(&remote.bare, &["log", "--format=%s", "main"]);
    assert_eq!(subjects.lines().filter(|s| *s == "add b").count(), 1);
}

#[tokio::test]
async fn test_transact_reruns_after_concurrent_writer() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await.with_id(Some("worker-1".into()));
    let other = remote.clone_as("producer");
    let attempts = Cell::new(0u32);

    let written = repo
        .transact(&fast_retry(), "add file", |workdir| {
            attempts.set(attempts.get() + 1);
            if attempts.get() == 1 {
                push_file(&other, "to_stt/a.txt", "a\n");
            }

            let path: PathBuf = workdir.join("to_stt/b.txt");
            std::fs::create_dir_all(path.parent().unwrap())?;
            std::fs::write(&path, "b\n")?;
            Ok(Mutation::Changed {
                paths: vec![path],
                action: "add b".to_string(),
                value: attempts.get(),
            })
        })
        .await
        .unwrap();

    assert_eq!(written, 2);
    assert_eq!(remote.commit_count(), 3);
    assert_eq!(remote.last_subject(), "worker-1, add b");
    assert!(repo.inbox().join("a.txt").exists());
    assert!(repo.inbox().join("b.txt").exists());
}

#[tokio::test]
async fn test_transact_unchanged_makes_no_commit() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;

    let value = repo
        .transact(&fast_retry(), "look", |_| Ok(Mutation::Unchanged(42)))
        .await
        .unwrap();

    assert_eq!(value, 42);
    assert_eq!(remote.commit_count(), 1);
}

#[tokio::test]
async fn test_transact_non_retryable_error_stops() {
    let remote = Remote::new();
    let repo = remote.repository("worker").await;
    let attempts = Cell::new(0u32);

    let result: Result<(), _> = repo
        .transact(&fast_retry(), "broken", |_| {
            attempts.set(attempts.get() + 1);
            Err(QueueError::Config("bad batch name".into()))
        })
        .await;

    assert!(matches!(result, Err(QueueError::Config(_))));
    assert_eq!(attempts.get(), 1);
}

#[tokio::test]
async fn test_open_rejects_plain_directory() {
    let temp = tempfile::TempDir::new().unwrap();
    let result = sttq::core::QueueRepository::open(temp.path()).await;
    assert!(result.is_err());
}

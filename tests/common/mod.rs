//! Shared fixtures: a bare "remote" repository plus independent clones.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;

use sttq::core::{QueueRepository, RetryPolicy};
use tempfile::TempDir;

/// Run git in `dir`, panicking on failure
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("failed to spawn git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn configure_identity(dir: &Path, name: &str) {
    git(dir, &["config", "user.name", name]);
    git(dir, &["config", "user.email", &format!("{}@example.com", name)]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}

/// A bare remote seeded with one commit on `main`
pub struct Remote {
    pub temp: TempDir,
    pub bare: PathBuf,
}

impl Remote {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let seed = temp.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();

        git(&seed, &["init", "--quiet"]);
        git(&seed, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        configure_identity(&seed, "seed");
        std::fs::write(seed.join("README"), "queue\n").unwrap();
        git(&seed, &["add", "README"]);
        git(&seed, &["commit", "--quiet", "-m", "init"]);

        let bare = temp.path().join("remote.git");
        git(
            temp.path(),
            &["clone", "--quiet", "--bare", "seed", "remote.git"],
        );

        Self { temp, bare }
    }

    /// Clone the remote into a fresh working copy named `name`
    pub fn clone_as(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join(name);
        git(
            self.temp.path(),
            &["clone", "--quiet", self.bare.to_str().unwrap(), name],
        );
        configure_identity(&dir, name);
        dir
    }

    /// Open a clone as a queue repository
    pub async fn repository(&self, name: &str) -> QueueRepository {
        let dir = self.clone_as(name);
        QueueRepository::open(dir).await.unwrap()
    }

    /// Number of commits on the remote's `main`
    pub fn commit_count(&self) -> usize {
        git(&self.bare, &["rev-list", "--count", "main"])
            .parse()
            .unwrap()
    }

    /// Subject of the newest commit on the remote
    pub fn last_subject(&self) -> String {
        git(&self.bare, &["log", "-1", "--format=%s", "main"])
    }

    /// Scratch directory next to the clones
    pub fn scratch(&self, name: &str) -> PathBuf {
        let dir = self.temp.path().join(name);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}

/// Commit and push a file from a plain clone, as another writer would
pub fn push_file(clone: &Path, rel: &str, content: impl AsRef<[u8]>) {
    let path = clone.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    git(clone, &["add", rel]);
    git(clone, &["commit", "--quiet", "-m", &format!("write {}", rel)]);
    git(clone, &["push", "--quiet", "origin", "main"]);
}

/// Pull the latest remote state into a plain clone
pub fn refresh(clone: &Path) {
    git(clone, &["pull", "--quiet", "--ff-only"]);
}

/// Retry policy without delays
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(5, 0)
}

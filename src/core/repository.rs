//! Git working copy used as the queue transport.
//!
//! All queue state lives in a shared repository. A process makes progress by
//! hard-resetting to the remote, mutating files, committing and pushing. The
//! remote's non-fast-forward rejection is the only mutual exclusion: when a
//! push is rejected the unit of work is thrown away by the next reset and run
//! again from scratch.
//!
//! Git runs as a subprocess so that the user's credentials, hooks and
//! transport configuration apply unchanged.

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use super::error::QueueError;
use super::retry::{retry, Backoff, RetryPolicy};

/// Inbox directory holding batch files of tasks still to be processed
pub const INBOX_DIR: &str = "to_stt";

/// Outbox directory holding processed result artifacts
pub const OUTBOX_DIR: &str = "from_stt";

/// File at the repository root whose content prefixes commit messages
pub const ID_FILE: &str = "id";

/// Default timeout for a single git subprocess
const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of [`QueueRepository::commit_and_push`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// The commit landed on the remote
    Committed { commit: String },

    /// Nothing was staged; no commit was created
    NothingToCommit,

    /// Another writer pushed first
    PushRejected { summary: String },
}

/// Mutation produced by one attempt of a unit of work
#[derive(Debug)]
pub enum Mutation<T> {
    /// Nothing changed on disk; no commit needed
    Unchanged(T),

    /// Files under the working copy changed and must be committed
    Changed {
        paths: Vec<PathBuf>,
        action: String,
        value: T,
    },
}

/// Build a commit message of the form `"<id>, <action>"`
pub fn commit_message(id: Option<&str>, action: &str) -> String {
    match id.map(str::trim).filter(|id| !id.is_empty()) {
        Some(id) => format!("{}, {}", id, action),
        None => action.to_string(),
    }
}

/// A git clone of the shared queue repository
#[derive(Debug, Clone)]
pub struct QueueRepository {
    workdir: PathBuf,
    id: Option<String>,
    git_timeout: Duration,
}

impl QueueRepository {
    /// Open an existing clone.
    ///
    /// Fails if `workdir` is not inside a git work tree.
    pub async fn open(workdir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let repo = Self {
            workdir: workdir.into(),
            id: None,
            git_timeout: DEFAULT_GIT_TIMEOUT,
        };

        if !repo.workdir.is_dir() {
            return Err(QueueError::Config(format!(
                "Queue directory does not exist: {}",
                repo.workdir.display()
            )));
        }

        let inside = repo.git(&["rev-parse", "--is-inside-work-tree"]).await?;
        if inside.trim() != "true" {
            return Err(QueueError::Config(format!(
                "Not a git work tree: {}",
                repo.workdir.display()
            )));
        }

        Ok(repo)
    }

    /// Attribution prefix for commit messages
    pub fn with_id(mut self, id: Option<String>) -> Self {
        self.id = id.filter(|id| !id.trim().is_empty());
        self
    }

    pub fn with_git_timeout(mut self, git_timeout: Duration) -> Self {
        self.git_timeout = git_timeout;
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn inbox(&self) -> PathBuf {
        self.workdir.join(INBOX_DIR)
    }

    pub fn outbox(&self) -> PathBuf {
        self.workdir.join(OUTBOX_DIR)
    }

    /// Run git and return the raw output, whatever the exit status
    async fn run(&self, args: &[&str]) -> Result<Output, QueueError> {
        debug!(args = ?args, "git");

        let child = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| QueueError::GitOperation {
                command: args.join(" "),
                stderr: format!("failed to spawn git: {}", e),
            })?;

        timeout(self.git_timeout, child.wait_with_output())
            .await
            .map_err(|_| QueueError::GitOperation {
                command: args.join(" "),
                stderr: format!("timed out after {:?}", self.git_timeout),
            })?
            .map_err(|e| QueueError::GitOperation {
                command: args.join(" "),
                stderr: e.to_string(),
            })
    }

    /// Run git and require success, returning stdout
    async fn git(&self, args: &[&str]) -> Result<String, QueueError> {
        let output = self.run(args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(command = %args.join(" "), %stderr, "git command failed");
            return Err(QueueError::GitOperation {
                command: args.join(" "),
                stderr,
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Name of the checked-out branch
    pub async fn current_branch(&self) -> Result<String, QueueError> {
        let branch = self.git(&["rev-parse", "--abbrev-ref", "HEAD"]).await?;
        let branch = branch.trim();
        if branch.is_empty() || branch == "HEAD" {
            return Err(QueueError::GitOperation {
                command: "rev-parse --abbrev-ref HEAD".to_string(),
                stderr: "working copy is on a detached HEAD".to_string(),
            });
        }
        Ok(branch.to_string())
    }

    /// Commit id of HEAD
    pub async fn head(&self) -> Result<String, QueueError> {
        Ok(self.git(&["rev-parse", "HEAD"]).await?.trim().to_string())
    }

    /// Tree id of HEAD (identifies the working-tree content after a sync)
    pub async fn tree_hash(&self) -> Result<String, QueueError> {
        Ok(self.git(&["rev-parse", "HEAD^{tree}"]).await?.trim().to_string())
    }

    /// Align the working copy with the remote.
    ///
    /// Fetches with prune, hard-resets to `origin/<branch>`, removes untracked
    /// files and directories, then pulls. Must precede every read.
    #[instrument(skip(self), fields(repo = %self.workdir.display()))]
    pub async fn sync(&self) -> Result<(), QueueError> {
        info!("Resetting queue repository to remote state");

        let branch = self.current_branch().await?;
        let upstream = format!("origin/{}", branch);

        self.git(&["fetch", "--all", "--prune"]).await?;
        self.git(&["reset", "--hard", &upstream]).await?;
        self.git(&["clean", "-fd"]).await?;
        self.git(&["pull", "--ff-only"]).await?;

        info!(%branch, "Queue repository synchronized with remote");
        Ok(())
    }

    /// [`QueueRepository::sync`] under a retry policy
    pub async fn sync_with_retry(&self, policy: &RetryPolicy) -> Result<(), QueueError> {
        retry(policy, "sync queue repository", move || self.sync()).await
    }

    fn relative<'p>(&self, path: &'p Path) -> Result<&'p Path, QueueError> {
        if let Ok(rel) = path.strip_prefix(&self.workdir) {
            return Ok(rel);
        }
        if path.is_absolute() {
            return Err(QueueError::Config(format!(
                "Path {} is outside the queue repository {}",
                path.display(),
                self.workdir.display()
            )));
        }
        Ok(path)
    }

    async fn is_tracked(&self, rel: &str) -> Result<bool, QueueError> {
        let listed = self.git(&["ls-files", "--", rel]).await?;
        Ok(!listed.trim().is_empty())
    }

    /// Stage `paths` plus every untracked file, commit and push.
    ///
    /// Paths that neither exist nor are tracked are ignored. When nothing ends
    /// up staged no commit is created. A rejected push leaves a local commit
    /// behind; the caller must `sync()` (which discards it) before retrying.
    #[instrument(skip(self, paths), fields(paths = paths.len()))]
    pub async fn commit_and_push(
        &self,
        paths: &[PathBuf],
        message: &str,
    ) -> Result<PushOutcome, QueueError> {
        let mut pathspecs: Vec<String> = Vec::new();
        for path in paths {
            let rel = self.relative(path)?.to_string_lossy().into_owned();
            if self.workdir.join(&rel).exists() || self.is_tracked(&rel).await? {
                pathspecs.push(rel);
            } else {
                debug!(path = %rel, "Skipping path that is neither present nor tracked");
            }
        }

        if !pathspecs.is_empty() {
            let mut args = vec!["add", "--all", "--"];
            args.extend(pathspecs.iter().map(String::as_str));
            self.git(&args).await?;
        }

        // NUL-separated so non-ASCII names are not quoted
        let untracked = self
            .git(&["ls-files", "-z", "--others", "--exclude-standard"])
            .await?;
        let untracked: Vec<&str> = untracked.split('\0').filter(|p| !p.is_empty()).collect();
        if !untracked.is_empty() {
            let mut args = vec!["add", "--"];
            args.extend(untracked.iter().copied());
            self.git(&args).await?;
        }

        let staged = self.run(&["diff", "--cached", "--quiet"]).await?;
        match staged.status.code() {
            Some(0) => {
                info!("No changes staged, skipping commit");
                return Ok(PushOutcome::NothingToCommit);
            }
            Some(1) => {}
            _ => {
                return Err(QueueError::GitOperation {
                    command: "diff --cached --quiet".to_string(),
                    stderr: String::from_utf8_lossy(&staged.stderr).trim().to_string(),
                })
            }
        }

        self.git(&["commit", "--quiet", "-m", message]).await?;
        let commit = self.head().await?;

        let branch = self.current_branch().await?;
        info!(%commit, %branch, "Pushing queue changes");
        let pushed = self.run(&["push", "origin", &branch]).await?;

        if pushed.status.success() {
            info!(%commit, "Changes pushed");
            return Ok(PushOutcome::Committed { commit });
        }

        let stderr = String::from_utf8_lossy(&pushed.stderr).trim().to_string();
        if is_rejection(&stderr) {
            warn!(%stderr, "Push rejected by remote");
            return Ok(PushOutcome::PushRejected { summary: stderr });
        }

        Err(QueueError::GitOperation {
            command: format!("push origin {}", branch),
            stderr,
        })
    }

    /// Run one sync -> mutate -> commit unit of work until it lands.
    ///
    /// `mutate` is called against a freshly reset working copy on every
    /// attempt, so partial changes from a failed attempt are never reapplied.
    /// Rejected pushes and git failures are retried under `policy`; errors
    /// returned by `mutate` itself are retried only if they are retryable.
    pub async fn transact<T, F>(
        &self,
        policy: &RetryPolicy,
        operation: &str,
        mut mutate: F,
    ) -> Result<T, QueueError>
    where
        F: FnMut(&Path) -> Result<Mutation<T>, QueueError>,
    {
        let mut backoff = Backoff::new(policy, operation);
        loop {
            match self.attempt(&mut mutate).await {
                Ok(value) => return Ok(value),
                Err(e) => backoff.failed(e).await?,
            }
        }
    }

    async fn attempt<T, F>(&self, mutate: &mut F) -> Result<T, QueueError>
    where
        F: FnMut(&Path) -> Result<Mutation<T>, QueueError>,
    {
        self.sync().await?;

        match mutate(&self.workdir)? {
            Mutation::Unchanged(value) => Ok(value),
            Mutation::Changed {
                paths,
                action,
                value,
            } => {
                let message = commit_message(self.id(), &action);
                match self.commit_and_push(&paths, &message).await? {
                    PushOutcome::Committed { .. } | PushOutcome::NothingToCommit => Ok(value),
                    PushOutcome::PushRejected { summary } => Err(QueueError::GitConflict(summary)),
                }
            }
        }
    }
}

fn is_rejection(stderr: &str) -> bool {
    const MARKERS: [&str; 4] = ["[rejected]", "non-fast-forward", "fetch first", "stale info"];
    MARKERS.iter().any(|m| stderr.contains(m))
}

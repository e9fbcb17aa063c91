//! Moving files in and out of the shared repository.
//!
//! - Publisher: local result artifacts -> outbox, local copies removed after
//!   the push lands
//! - Collector: outbox -> local directory, outbox entries deleted
//! - Enqueue: new batch file of tasks -> inbox
//!
//! "Nothing to do" is a success everywhere.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use super::error::QueueError;
use super::repository::{Mutation, QueueRepository};
use super::retry::RetryPolicy;
use super::selector::list_visible_files;
use crate::domain::Task;

fn file_name(path: &Path) -> Result<&std::ffi::OsStr, QueueError> {
    path.file_name()
        .ok_or_else(|| QueueError::Config(format!("Not a file path: {}", path.display())))
}

/// Copy `files` into the outbox in one commit, then delete the local copies.
///
/// Returns the number of files published.
pub async fn publish(
    repo: &QueueRepository,
    retry: &RetryPolicy,
    files: &[PathBuf],
) -> Result<usize, QueueError> {
    if files.is_empty() {
        info!("No result files to publish");
        return Ok(0);
    }

    let outbox = repo.outbox();
    let count = repo
        .transact(retry, "publish results", |_| {
            fs::create_dir_all(&outbox)?;
            let mut paths = Vec::with_capacity(files.len());
            for file in files {
                let dest = outbox.join(file_name(file)?);
                fs::copy(file, &dest)?;
                paths.push(dest);
            }
            Ok(Mutation::Changed {
                action: format!("upload {} processed files", paths.len()),
                value: paths.len(),
                paths,
            })
        })
        .await?;

    for file in files {
        if let Err(e) = fs::remove_file(file) {
            warn!(file = %file.display(), error = %e, "Failed to remove published local file");
        }
    }

    info!(count, "Published result files");
    Ok(count)
}

/// Publish every non-hidden file left in `output_dir`.
///
/// Picks up results stranded by an interrupted run.
pub async fn publish_pending(
    repo: &QueueRepository,
    retry: &RetryPolicy,
    output_dir: &Path,
) -> Result<usize, QueueError> {
    let files = list_visible_files(output_dir)?;
    if files.is_empty() {
        info!(dir = %output_dir.display(), "No processed files waiting to be published");
        return Ok(0);
    }
    info!(count = files.len(), dir = %output_dir.display(), "Publishing processed files");
    publish(repo, retry, &files).await
}

/// Copy every outbox file into `dest` and delete it from the repository.
///
/// Returns the local paths of the collected files.
pub async fn collect(
    repo: &QueueRepository,
    retry: &RetryPolicy,
    dest: &Path,
) -> Result<Vec<PathBuf>, QueueError> {
    let outbox = repo.outbox();

    let collected = repo
        .transact(retry, "collect results", |_| {
            let files = list_visible_files(&outbox)?;
            if files.is_empty() {
                return Ok(Mutation::Unchanged(Vec::new()));
            }

            fs::create_dir_all(dest)?;
            let mut local = Vec::with_capacity(files.len());
            for file in &files {
                let target = dest.join(file_name(file)?);
                fs::copy(file, &target)?;
                fs::remove_file(file)?;
                local.push(target);
            }

            Ok(Mutation::Changed {
                action: format!("collect {} processed files", files.len()),
                paths: files,
                value: local,
            })
        })
        .await?;

    if collected.is_empty() {
        info!("Outbox is empty, nothing to collect");
    } else {
        info!(count = collected.len(), dest = %dest.display(), "Collected result files");
    }
    Ok(collected)
}

/// Default batch file name for newly enqueued tasks
pub fn default_batch_name() -> String {
    Local::now().format("%Y%m%d-%H%M%S.txt").to_string()
}

/// Append `tasks` to batch file `batch_name` in the inbox (producer side).
///
/// Returns the number of tasks enqueued.
pub async fn enqueue(
    repo: &QueueRepository,
    retry: &RetryPolicy,
    tasks: &[Task],
    batch_name: &str,
) -> Result<usize, QueueError> {
    if tasks.is_empty() {
        info!("No tasks to enqueue");
        return Ok(0);
    }
    if batch_name.starts_with('.') || batch_name.contains(['/', '\\']) {
        return Err(QueueError::Config(format!(
            "Invalid batch file name: {:?}",
            batch_name
        )));
    }

    let batch = repo.inbox().join(batch_name);
    let count = repo
        .transact(retry, "enqueue tasks", |_| {
            if let Some(parent) = batch.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut content = match fs::read(&batch) {
                Ok(existing) => existing,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
                Err(e) => return Err(e.into()),
            };
            if content.last().is_some_and(|b| *b != b'\n') {
                content.push(b'\n');
            }
            for task in tasks {
                content.extend_from_slice(task.to_line().as_bytes());
                content.push(b'\n');
            }
            fs::write(&batch, content)?;

            Ok(Mutation::Changed {
                paths: vec![batch.clone()],
                action: format!("enqueue {} tasks into {}", tasks.len(), batch_name),
                value: tasks.len(),
            })
        })
        .await?;

    info!(count, batch = %batch_name, "Tasks enqueued");
    Ok(count)
}

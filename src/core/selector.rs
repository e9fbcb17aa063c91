//! Outbound selection: pick exactly one task from the inbox.
//!
//! Batch files are scanned in file-name order. The chosen line is removed
//! from its file, and a file left without tasks is deleted so that an empty
//! inbox directory is the only "drained" signal.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use super::error::QueueError;
use super::repository::{Mutation, QueueRepository};
use super::retry::RetryPolicy;
use super::worklist::{join_lines, split_lines, WorkList};
use crate::domain::Task;

/// How a duration bound is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationMode {
    /// First task strictly shorter than the limit
    LessThan,

    /// First task strictly longer than the limit, else the first task seen
    BetterGreaterThan,
}

/// Which task to take next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    Fifo,
    DurationBounded { limit: u64, mode: DurationMode },
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        Self::Fifo
    }
}

/// Outcome of one selection
#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    Selected {
        task: Task,
        source_file: PathBuf,
        /// True when `better_greater_than` settled for the first task seen
        fallback: bool,
    },

    /// Tasks are pending but none satisfies a `less_than` bound
    NoMatch { pending: usize },

    /// No batch files remain
    QueueEmpty,
}

impl Selection {
    pub fn is_selected(&self) -> bool {
        matches!(self, Self::Selected { .. })
    }
}

/// Result of scanning the inbox: the selection plus every file touched
#[derive(Debug)]
pub struct Scan {
    pub selection: Selection,
    pub touched: Vec<PathBuf>,
}

/// A batch file loaded into memory.
///
/// Lines are kept as raw bytes and written back unchanged; only the removed
/// line differs after [`BatchFile::persist`].
#[derive(Debug, Clone)]
pub struct BatchFile {
    pub path: PathBuf,
    lines: Vec<BatchLine>,
}

#[derive(Debug, Clone)]
struct BatchLine {
    raw: Vec<u8>,
    task: Option<Task>,
}

impl BatchFile {
    pub fn read(path: &Path) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        let lines = split_lines(&bytes)
            .into_iter()
            .map(|raw| BatchLine {
                task: Task::parse_bytes(&raw),
                raw,
            })
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            lines,
        })
    }

    /// Tasks with the index of the line they came from
    pub fn tasks(&self) -> impl Iterator<Item = (usize, Task)> + '_ {
        self.lines
            .iter()
            .enumerate()
            .filter_map(|(idx, line)| line.task.clone().map(|task| (idx, task)))
    }

    pub fn has_tasks(&self) -> bool {
        self.lines.iter().any(|line| line.task.is_some())
    }

    /// Whether a line for this task is still in the file
    pub fn contains(&self, task: &Task) -> bool {
        self.lines
            .iter()
            .any(|line| line.task.as_ref().is_some_and(|t| t.line() == task.line()))
    }

    fn remove_line(&mut self, idx: usize) {
        self.lines.remove(idx);
    }

    /// Write the file back, or delete it if no task remains.
    ///
    /// Returns `true` if the file still exists.
    pub fn persist(&self) -> io::Result<bool> {
        if !self.has_tasks() {
            fs::remove_file(&self.path)?;
            return Ok(false);
        }
        let raw: Vec<Vec<u8>> = self.lines.iter().map(|line| line.raw.clone()).collect();
        fs::write(&self.path, join_lines(&raw))?;
        Ok(true)
    }
}

/// Regular, non-hidden files of `dir` sorted by file name.
///
/// A missing directory is an empty listing.
pub fn list_visible_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if !hidden && entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// Number of pending tasks across all batch files
pub fn pending_count(inbox: &Path) -> Result<usize, QueueError> {
    let mut count = 0;
    for path in list_visible_files(inbox)? {
        count += BatchFile::read(&path)?.tasks().count();
    }
    Ok(count)
}

/// Select one task from `inbox` and remove it from its batch file.
///
/// Batch files without tasks are deleted along the way. Deterministic for a
/// given inbox content.
pub fn select(inbox: &Path, policy: &SelectionPolicy) -> Result<Scan, QueueError> {
    let mut touched = Vec::new();
    let mut batches = Vec::new();

    for path in list_visible_files(inbox)? {
        let batch = BatchFile::read(&path)?;
        if batch.has_tasks() {
            batches.push(batch);
        } else {
            info!(file = %path.display(), "Deleting batch file without tasks");
            fs::remove_file(&path)?;
            touched.push(path);
        }
    }

    let pending: usize = batches.iter().map(|b| b.tasks().count()).sum();
    if pending == 0 {
        return Ok(Scan {
            selection: Selection::QueueEmpty,
            touched,
        });
    }

    let Some((batch_idx, line_idx, task, fallback)) = choose(&batches, policy) else {
        return Ok(Scan {
            selection: Selection::NoMatch { pending },
            touched,
        });
    };

    let batch = &mut batches[batch_idx];
    batch.remove_line(line_idx);
    if !batch.persist()? {
        info!(file = %batch.path.display(), "Batch file drained, deleted");
    }
    touched.push(batch.path.clone());

    Ok(Scan {
        selection: Selection::Selected {
            task,
            source_file: batch.path.clone(),
            fallback,
        },
        touched,
    })
}

/// Locate the task to take: (batch index, line index, task, fallback)
fn choose(batches: &[BatchFile], policy: &SelectionPolicy) -> Option<(usize, usize, Task, bool)> {
    let mut candidates = batches
        .iter()
        .enumerate()
        .flat_map(|(b, batch)| batch.tasks().map(move |(l, task)| (b, l, task)));

    match *policy {
        SelectionPolicy::Fifo => candidates.next().map(|(b, l, task)| (b, l, task, false)),
        SelectionPolicy::DurationBounded {
            limit,
            mode: DurationMode::LessThan,
        } => candidates
            .find(|(_, _, task)| task.duration().is_some_and(|d| d < limit))
            .map(|(b, l, task)| (b, l, task, false)),
        SelectionPolicy::DurationBounded {
            limit,
            mode: DurationMode::BetterGreaterThan,
        } => {
            let mut first = None;
            for (b, l, task) in candidates {
                if task.duration().is_some_and(|d| d > limit) {
                    return Some((b, l, task, false));
                }
                if first.is_none() {
                    first = Some((b, l, task));
                }
            }
            first.map(|(b, l, task)| (b, l, task, true))
        }
    }
}

/// Take the next task from the shared inbox and append it to the work list.
///
/// Runs as one repository transaction. The task is written to the work list
/// before its removal is pushed, so an interrupted run can at worst process
/// a task twice, never lose it. When a push is rejected and the task is
/// still queued after the resync, the line is taken back out of the work
/// list before the next attempt.
pub async fn take_next(
    repo: &QueueRepository,
    retry: &RetryPolicy,
    policy: &SelectionPolicy,
    worklist: &WorkList,
) -> Result<Selection, QueueError> {
    let inbox = repo.inbox();
    let mut handed_over: Option<Task> = None;

    let selection = repo
        .transact(retry, "take next task", |_| {
            if let Some(previous) = handed_over.take() {
                if still_queued(&inbox, &previous)? {
                    worklist.remove(&previous)?;
                    debug!(task = %previous.identity(), "Push did not land, task handed back");
                }
            }

            let scan = select(&inbox, policy)?;
            if scan.touched.is_empty() {
                return Ok(Mutation::Unchanged(scan.selection));
            }

            let action = match &scan.selection {
                Selection::Selected {
                    task, source_file, ..
                } => {
                    if worklist.contains(task)? {
                        info!(task = %task.identity(), "Task already in the work list");
                    } else {
                        worklist.append(task)?;
                        handed_over = Some(task.clone());
                    }
                    format!("take {} from {}", task.line(), file_label(source_file))
                }
                _ => format!("delete {} empty batch files", scan.touched.len()),
            };

            Ok(Mutation::Changed {
                paths: scan.touched,
                action,
                value: scan.selection,
            })
        })
        .await?;

    match &selection {
        Selection::Selected {
            task,
            source_file,
            fallback,
        } => {
            if *fallback {
                warn!(task = %task.identity(), "No task exceeds the duration bound, took the first one instead");
            }
            info!(task = %task.identity(), source = %file_label(source_file), "Task taken from queue");
        }
        Selection::NoMatch { pending } => {
            info!(pending, "No pending task satisfies the duration bound");
        }
        Selection::QueueEmpty => info!("Queue is empty"),
    }

    Ok(selection)
}

fn still_queued(inbox: &Path, task: &Task) -> Result<bool, QueueError> {
    for path in list_visible_files(inbox)? {
        if BatchFile::read(&path)?.contains(task) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

//! Local "next work" file.
//!
//! Tasks taken from the shared inbox are appended here; the driver works
//! through this file and removes each line once its disposition is final.
//! The file is re-read before every removal so lines added by hand while a
//! task was running are preserved.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::domain::{Disposition, Task};

/// Line-oriented work list on the local filesystem
#[derive(Debug, Clone)]
pub struct WorkList {
    path: PathBuf,
}

impl WorkList {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(&self) -> io::Result<Vec<Vec<u8>>> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(split_lines(&bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }

    /// Tasks currently waiting, in file order
    pub fn pending(&self) -> io::Result<Vec<Task>> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|line| Task::parse_bytes(line))
            .collect())
    }

    /// Whether a line for this task is already waiting
    pub fn contains(&self, task: &Task) -> io::Result<bool> {
        Ok(self.pending()?.iter().any(|t| t.line() == task.line()))
    }

    /// Append a task line
    pub fn append(&self, task: &Task) -> io::Result<()> {
        append_line(&self.path, task.line())
    }

    /// Remove the first line equal to the task's line.
    ///
    /// Other lines are written back byte for byte. Returns `false` if the
    /// line was already gone.
    pub fn remove(&self, task: &Task) -> io::Result<bool> {
        let mut lines = self.read_lines()?;
        let position = lines.iter().position(|raw| {
            Task::parse_bytes(raw).is_some_and(|t| t.line() == task.line())
        });
        let Some(idx) = position else {
            info!(task = %task.identity(), "Task was removed from the work list while running");
            return Ok(false);
        };
        lines.remove(idx);

        fs::write(&self.path, join_lines(&lines))?;
        debug!(task = %task.identity(), "Task removed from work list");
        Ok(true)
    }
}

/// Split file content on `\n` without decoding it.
///
/// A trailing newline does not produce an empty last line.
pub(crate) fn split_lines(bytes: &[u8]) -> Vec<Vec<u8>> {
    if bytes.is_empty() {
        return Vec::new();
    }
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    body.split(|b| *b == b'\n').map(<[u8]>::to_vec).collect()
}

/// Inverse of [`split_lines`]; non-empty output always ends in `\n`.
pub(crate) fn join_lines(lines: &[Vec<u8>]) -> Vec<u8> {
    let mut content = Vec::new();
    for line in lines {
        content.extend_from_slice(line);
        content.push(b'\n');
    }
    content
}

/// Append-only logs of finished tasks, one file per disposition
#[derive(Debug, Clone)]
pub struct DispositionLog {
    dir: PathBuf,
}

impl DispositionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, disposition: Disposition) -> PathBuf {
        self.dir.join(disposition.log_file_name())
    }

    pub fn record(&self, disposition: Disposition, task: &Task) -> io::Result<()> {
        append_line(&self.path_for(disposition), task.line())
    }
}

/// Append one line, creating parent directories and fixing a missing
/// trailing newline on the existing content.
fn append_line(path: &Path, line: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let needs_newline = match fs::read(path) {
        Ok(bytes) => bytes.last().is_some_and(|b| *b != b'\n'),
        Err(e) if e.kind() == io::ErrorKind::NotFound => false,
        Err(e) => return Err(e),
    };

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_newline {
        file.write_all(b"\n")?;
    }
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    file.flush()
}

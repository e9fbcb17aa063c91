//! Configuration for the queue worker.
//!
//! Configuration sources (highest priority first):
//! 1. `--config <path>` / `STTQ_CONFIG`
//! 2. `config.json` in the current directory
//! 3. Defaults
//!
//! Paths in the config file are relative to the config file's parent
//! directory. The loaded struct is passed explicitly to every component.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::bilibili::DEFAULT_API_BASE;
use crate::adapters::whisper::default_args;
use crate::core::repository::ID_FILE;
use crate::core::RetryPolicy;

/// Default config file name, looked up in the current directory
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Worker configuration (matches `config.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Git clone holding `to_stt/` and `from_stt/`
    pub queue_directory: PathBuf,

    /// Finished artifacts waiting to be published
    pub output_directory: PathBuf,

    /// Scratch space for `audio.mp3`, `audio.json` and transcriber output
    pub temp_directory: PathBuf,

    /// Producer-side list of video links to enqueue
    pub bv_list_file: Option<PathBuf>,

    /// Local next-work file that selected task lines are appended to
    pub dst_file: PathBuf,

    /// Where the collector copies outbox files
    pub collect_directory: PathBuf,

    /// Directory for `<disposition>.txt` logs (defaults to the `dst_file` directory)
    pub disposition_directory: Option<PathBuf>,

    /// Skip videos longer than this many seconds (0 = no limit)
    pub max_duration: u64,

    /// Pull/process/publish iterations per `run` (0 = until the queue drains)
    pub max_iterations: u32,

    /// Run the outbox collector when the driver stops
    pub collect_on_drain: bool,

    /// Policy for network calls made while processing a task
    pub retry: RetryPolicy,

    /// Policy for repository synchronization (0 attempts = forever)
    pub sync_retry: RetryPolicy,

    pub network_timeout_seconds: u64,

    pub git_timeout_seconds: u64,

    pub transcriber: TranscriberConfig,

    /// Video platform API host
    pub api_base: String,

    /// Directory relative paths were resolved against
    #[serde(skip)]
    pub base_dir: PathBuf,

    /// Config file the values came from, if any
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    pub binary: String,
    pub args: Vec<String>,
    /// Kill the transcriber after this many seconds (unset = no limit)
    pub timeout_seconds: Option<u64>,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            binary: "faster-whisper-xxl".to_string(),
            args: default_args(),
            timeout_seconds: None,
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_directory: PathBuf::from("queue"),
            output_directory: PathBuf::from("output"),
            temp_directory: PathBuf::from("tmp"),
            bv_list_file: None,
            dst_file: PathBuf::from("input.txt"),
            collect_directory: PathBuf::from("collected"),
            disposition_directory: None,
            max_duration: 0,
            max_iterations: 3,
            collect_on_drain: true,
            retry: RetryPolicy::default(),
            sync_retry: RetryPolicy::unbounded(10),
            network_timeout_seconds: 30,
            git_timeout_seconds: 120,
            transcriber: TranscriberConfig::default(),
            api_base: DEFAULT_API_BASE.to_string(),
            base_dir: PathBuf::from("."),
            config_file: None,
        }
    }
}

/// Resolve a path that may be relative to the config file's parent
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

impl QueueConfig {
    /// Load configuration from `path`, or from `config.json` in the current
    /// directory when no path is given.
    ///
    /// An explicit path must exist. A missing default file yields defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to determine current directory")?;

        let config_path = match path {
            Some(p) => Some(resolve_path(&cwd, p)),
            None => {
                let candidate = cwd.join(CONFIG_FILE_NAME);
                if candidate.exists() {
                    Some(candidate)
                } else {
                    warn!(
                        path = %candidate.display(),
                        "Config file not found, using defaults"
                    );
                    None
                }
            }
        };

        let Some(config_path) = config_path else {
            return Ok(Self::default().resolve(&cwd));
        };

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        let base = config_path.parent().unwrap_or(&cwd).to_path_buf();

        let mut config = Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?
            .resolve(&base);
        config.config_file = Some(config_path);
        debug!(?config, "Configuration loaded");
        Ok(config)
    }

    /// Parse configuration without resolving paths
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Make every relative path absolute against `base`
    pub fn resolve(mut self, base: &Path) -> Self {
        self.queue_directory = resolve_path(base, &self.queue_directory);
        self.output_directory = resolve_path(base, &self.output_directory);
        self.temp_directory = resolve_path(base, &self.temp_directory);
        self.dst_file = resolve_path(base, &self.dst_file);
        self.collect_directory = resolve_path(base, &self.collect_directory);
        self.bv_list_file = self.bv_list_file.map(|p| resolve_path(base, &p));
        self.disposition_directory = self.disposition_directory.map(|p| resolve_path(base, &p));
        self.base_dir = base.to_path_buf();
        self
    }

    /// Directory holding the per-disposition logs
    pub fn disposition_dir(&self) -> PathBuf {
        match &self.disposition_directory {
            Some(dir) => dir.clone(),
            None => self
                .dst_file
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.base_dir.clone()),
        }
    }

    /// Commit attribution from the `id` file (queue root first, then the
    /// config directory). Empty files count as absent.
    pub fn commit_id(&self) -> Option<String> {
        [
            self.queue_directory.join(ID_FILE),
            self.base_dir.join(ID_FILE),
        ]
        .iter()
        .filter_map(|p| std::fs::read_to_string(p).ok())
        .map(|s| s.trim().to_string())
        .find(|s| !s.is_empty())
    }

    pub fn network_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.network_timeout_seconds)
    }

    pub fn git_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.git_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_duration, 0);
        assert!(config.sync_retry.is_unbounded());
        assert_eq!(config.retry.max_attempts, 10);
        assert_eq!(config.transcriber.args, default_args());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = QueueConfig::from_json(
            r#"{
                "queue_directory": "/srv/queue",
                "dst_file": "work/input.txt",
                "max_duration": 3600,
                "retry": {"max_attempts": 3}
            }"#,
        )
        .unwrap();

        assert_eq!(config.queue_directory, PathBuf::from("/srv/queue"));
        assert_eq!(config.max_duration, 3600);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.interval_seconds, 5);
        assert_eq!(config.output_directory, PathBuf::from("output"));
    }

    #[test]
    fn test_resolve_relative_paths() {
        let config = QueueConfig::from_json(
            r#"{"queue_directory": "/srv/queue", "dst_file": "work/input.txt"}"#,
        )
        .unwrap()
        .resolve(Path::new("/home/user/worker"));

        assert_eq!(config.queue_directory, PathBuf::from("/srv/queue"));
        assert_eq!(config.dst_file, PathBuf::from("/home/user/worker/work/input.txt"));
        assert_eq!(config.disposition_dir(), PathBuf::from("/home/user/worker/work"));
        assert_eq!(config.temp_directory, PathBuf::from("/home/user/worker/tmp"));
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("worker.json");
        std::fs::write(&path, r#"{"output_directory": "out", "max_iterations": 7}"#).unwrap();

        let config = QueueConfig::load(Some(&path)).unwrap();
        assert_eq!(config.output_directory, temp.path().join("out"));
        assert_eq!(config.max_iterations, 7);
        assert_eq!(config.config_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = TempDir::new().unwrap();
        assert!(QueueConfig::load(Some(&temp.path().join("nope.json"))).is_err());
    }

    #[test]
    fn test_commit_id_lookup_order() {
        let temp = TempDir::new().unwrap();
        let queue = temp.path().join("queue");
        std::fs::create_dir_all(&queue).unwrap();

        let config = QueueConfig::default().resolve(temp.path());
        assert_eq!(config.commit_id(), None);

        std::fs::write(temp.path().join("id"), "laptop\n").unwrap();
        assert_eq!(config.commit_id().as_deref(), Some("laptop"));

        std::fs::write(queue.join("id"), "  colab-1 \n").unwrap();
        assert_eq!(config.commit_id().as_deref(), Some("colab-1"));
    }
}

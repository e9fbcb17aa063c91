//! Error taxonomy for queue operations.

use thiserror::Error;

/// Errors raised while moving tasks through the repository
#[derive(Debug, Error)]
pub enum QueueError {
    /// Network hiccup talking to the platform API or a download host
    #[error("Transient network error: {0}")]
    TransientNetwork(String),

    /// A git subcommand exited unsuccessfully
    #[error("git {command} failed: {stderr}")]
    GitOperation { command: String, stderr: String },

    /// The remote moved ahead of us; the whole unit of work must be redone
    #[error("Push rejected by remote: {0}")]
    GitConflict(String),

    #[error("Malformed task line {line:?}: {reason}")]
    MalformedTask { line: String, reason: String },

    /// Transcriber, resolver or downloader reported a permanent failure
    #[error("{tool} failed: {message}")]
    ExternalTool { tool: String, message: String },

    /// Terminal: the retry budget ran out
    #[error("{operation} gave up after {attempts} attempts: {last_error}")]
    ExhaustedRetries {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    /// Another driver holds the work-list lock
    #[error("Queue is busy: {0}")]
    Busy(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl QueueError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientNetwork(_) | Self::GitOperation { .. } | Self::GitConflict(_)
        )
    }
}

//! Interfaces to the external collaborators of the driver.
//!
//! The queue only depends on these traits. Default implementations talk to
//! the video platform over HTTP and shell out to a Whisper binary.

pub mod bilibili;
pub mod downloader;
pub mod whisper;

use std::path::Path;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::QueueError;
use crate::domain::{ArtifactSet, TaskMetadata};

pub use bilibili::BilibiliClient;
pub use downloader::HttpDownloader;
pub use whisper::WhisperTranscriber;

/// Failure reported by a collaborator
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// Network or server-side failure worth retrying
    #[error("Request failed: {0}")]
    Transient(String),

    /// The service answered, but refused or returned something unusable
    #[error("{service} rejected the request: {message}")]
    Rejected { service: String, message: String },

    /// A local tool exited unsuccessfully
    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },
}

impl CollaboratorError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for CollaboratorError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<std::io::Error> for CollaboratorError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<CollaboratorError> for QueueError {
    fn from(e: CollaboratorError) -> Self {
        match e {
            CollaboratorError::Transient(msg) => QueueError::TransientNetwork(msg),
            CollaboratorError::Rejected { service, message } => QueueError::ExternalTool {
                tool: service,
                message,
            },
            CollaboratorError::Tool { tool, message } => QueueError::ExternalTool { tool, message },
        }
    }
}

/// Answer of a metadata lookup
#[derive(Debug, Clone, PartialEq)]
pub enum VideoLookup {
    Found(TaskMetadata),

    /// Deleted or never existed
    NotFound(String),

    /// Exists but may not be downloaded (supporter-only, private)
    Forbidden(String),

    /// Under review; may become available later
    Pending(String),
}

/// Result of a download attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed { bytes: u64, resumed: bool },
    Failed { reason: String },
}

#[async_trait]
pub trait VideoMetadataProvider: Send + Sync {
    /// Look up a video by id
    async fn get_video(&self, bvid: &str) -> Result<VideoLookup, CollaboratorError>;
}

#[async_trait]
pub trait AudioLinkResolver: Send + Sync {
    /// Audio stream URL for a video part; `None` when no usable stream exists
    async fn resolve(&self, bvid: &str, cid: u64) -> Result<Option<String>, CollaboratorError>;
}

#[async_trait]
pub trait ResumableDownloader: Send + Sync {
    /// Download `url` to `dest`, resuming a partial file if present
    async fn fetch(&self, url: &str, dest: &Path) -> Result<DownloadOutcome, CollaboratorError>;
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Human-readable tool name
    fn name(&self) -> &str;

    /// Transcribe `audio_path`, producing `.srt`, `.txt` and `.text` sidecars
    async fn run(&self, audio_path: &Path) -> Result<ArtifactSet, CollaboratorError>;
}

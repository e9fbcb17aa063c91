//! Task lines as they are stored in inbox batch files.
//!
//! A task line is either a single-line JSON object carrying resolved video
//! metadata, or opaque text (usually a video URL). There is no third state:
//! a line that looks like JSON but fails to decode is logged and treated as
//! opaque text.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::QueueError;

/// Resolved video metadata carried by a JSON task line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    /// Platform video id (e.g. `BV1GJ411x7h7`)
    pub bvid: String,

    /// Stream id of the first part of the video
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cid: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Uploader name (older producers wrote `up_name`)
    #[serde(default, alias = "up_name", skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,

    /// Duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,

    /// Publish date as unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubdate: Option<i64>,

    /// Availability status reported by the platform (`normal`, `upower`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    /// Fields this crate does not interpret, preserved on re-encode
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TaskMetadata {
    /// Metadata with only the video id known
    pub fn new(bvid: impl Into<String>) -> Self {
        Self {
            bvid: bvid.into(),
            cid: None,
            title: None,
            owner: None,
            duration: None,
            pubdate: None,
            status: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Whether the platform restricts this video to paying supporters
    pub fn is_exclusive(&self) -> bool {
        self.status.as_deref() == Some("upower")
    }
}

/// One unit of work: the original line plus whatever metadata it carried
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    line: String,
    metadata: Option<TaskMetadata>,
}

impl Task {
    /// Parse one line of a batch file.
    ///
    /// Returns `None` for blank lines and `#` comments.
    pub fn parse_line(raw: &str) -> Option<Self> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let metadata = if line.starts_with('{') {
            match serde_json::from_str::<TaskMetadata>(line) {
                Ok(metadata) => Some(metadata),
                Err(e) => {
                    let err = QueueError::MalformedTask {
                        line: line.to_string(),
                        reason: e.to_string(),
                    };
                    warn!(error = %err, "Treating task line as opaque text");
                    None
                }
            }
        } else {
            None
        };

        Some(Self {
            line: line.to_string(),
            metadata,
        })
    }

    /// Parse one raw line. Lines that are not valid UTF-8 are skipped.
    pub fn parse_bytes(raw: &[u8]) -> Option<Self> {
        match std::str::from_utf8(raw) {
            Ok(line) => Self::parse_line(line),
            Err(e) => {
                let err = QueueError::MalformedTask {
                    line: String::from_utf8_lossy(raw).into_owned(),
                    reason: e.to_string(),
                };
                warn!(error = %err, "Skipping task line");
                None
            }
        }
    }

    /// Build a JSON task from resolved metadata
    pub fn from_metadata(metadata: TaskMetadata) -> Result<Self, QueueError> {
        let line = serde_json::to_string(&metadata)?;
        Ok(Self {
            line,
            metadata: Some(metadata),
        })
    }

    /// The line exactly as it appears in the batch file (trimmed)
    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn metadata(&self) -> Option<&TaskMetadata> {
        self.metadata.as_ref()
    }

    /// Declared duration in seconds; opaque lines never declare one
    pub fn duration(&self) -> Option<u64> {
        self.metadata.as_ref().and_then(|m| m.duration)
    }

    /// Video id from the metadata, or the first `BV` id found in an opaque line
    pub fn bvid(&self) -> Option<String> {
        if let Some(metadata) = &self.metadata {
            return Some(metadata.bvid.clone());
        }
        bvid_pattern()
            .find(&self.line)
            .map(|m| m.as_str().to_string())
    }

    /// Short identity used in log lines
    pub fn identity(&self) -> String {
        self.bvid().unwrap_or_else(|| self.line.clone())
    }

    /// Encode back to a single batch-file line
    pub fn to_line(&self) -> String {
        match &self.metadata {
            Some(metadata) => serde_json::to_string(metadata).unwrap_or_else(|_| self.line.clone()),
            None => self.line.clone(),
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.line)
    }
}

fn bvid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"BV[0-9A-Za-z]{10}").expect("valid bvid pattern"))
}

//! Whisper transcription backend.
//!
//! Shells out to a local faster-whisper binary. The binary writes its
//! `.srt`, `.txt` and `.text` outputs next to the source audio file.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info};

use super::{CollaboratorError, Transcriber};
use crate::domain::ArtifactSet;

const TOOL_NAME: &str = "whisper";

/// Arguments passed after the audio path when none are configured
pub fn default_args() -> Vec<String> {
    [
        "-m",
        "large-v2",
        "-l",
        "Chinese",
        "--vad_method",
        "pyannote_v3",
        "--ff_vocal_extract",
        "mdx_kim2",
        "--sentence",
        "-v",
        "true",
        "-o",
        "source",
        "-f",
        "txt",
        "srt",
        "text",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

/// Transcriber backed by an external whisper executable
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    binary: String,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl WhisperTranscriber {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            args: default_args(),
            timeout: None,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Kill the transcriber if it runs longer than `limit`
    pub fn with_timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    fn name(&self) -> &str {
        TOOL_NAME
    }

    async fn run(&self, audio_path: &Path) -> Result<ArtifactSet, CollaboratorError> {
        if !audio_path.exists() {
            return Err(CollaboratorError::Tool {
                tool: TOOL_NAME.to_string(),
                message: format!("audio file not found: {}", audio_path.display()),
            });
        }

        info!(audio = %audio_path.display(), binary = %self.binary, "Starting transcription");

        let mut command = Command::new(&self.binary);
        command
            .arg(audio_path)
            .args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => timeout(limit, command.output())
                .await
                .map_err(|_| CollaboratorError::Tool {
                    tool: TOOL_NAME.to_string(),
                    message: format!("timed out after {}s", limit.as_secs()),
                })?,
            None => command.output().await,
        }
        .map_err(|e| CollaboratorError::Tool {
            tool: TOOL_NAME.to_string(),
            message: format!("failed to start {}: {}", self.binary, e),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CollaboratorError::Tool {
                tool: TOOL_NAME.to_string(),
                message: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }
        debug!(stdout = %String::from_utf8_lossy(&output.stdout), "Transcriber output");

        let artifacts = ArtifactSet::beside(audio_path);
        let missing: Vec<String> = artifacts
            .paths()
            .iter()
            .filter(|p| !p.exists())
            .map(|p| p.display().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(CollaboratorError::Tool {
                tool: TOOL_NAME.to_string(),
                message: format!("missing outputs: {}", missing.join(", ")),
            });
        }

        info!(audio = %audio_path.display(), "Transcription complete");
        Ok(artifacts)
    }
}

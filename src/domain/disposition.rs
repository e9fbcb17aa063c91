//! Final classification of a processed task.

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to a task after one processing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Transcribed and handed to the publisher
    Ok,

    /// Transient failure; the line stays in the work list for a later run
    Failed,

    /// Restricted content that will never be downloadable
    Excluded,

    /// Permanent failure (missing video, tool failure, bad line)
    Error,

    /// Longer than the configured maximum duration
    TooLong,
}

impl Disposition {
    pub const ALL: [Disposition; 5] = [
        Disposition::Ok,
        Disposition::Failed,
        Disposition::Excluded,
        Disposition::Error,
        Disposition::TooLong,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Excluded => "excluded",
            Self::Error => "error",
            Self::TooLong => "too-long",
        }
    }

    /// Whether the task line is kept for another attempt
    pub fn keeps_task(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Name of the append-only log collecting tasks with this disposition
    pub fn log_file_name(&self) -> String {
        format!("{}.txt", self.as_str())
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_failed_keeps_task() {
        for disposition in Disposition::ALL {
            assert_eq!(disposition.keeps_task(), disposition == Disposition::Failed);
        }
    }

    #[test]
    fn test_serde_names_match_log_files() {
        let json = serde_json::to_string(&Disposition::TooLong).unwrap();
        assert_eq!(json, "\"too-long\"");
        assert_eq!(Disposition::TooLong.log_file_name(), "too-long.txt");
        assert_eq!(Disposition::Ok.to_string(), "ok");
    }
}

//! Result artifacts produced by the transcriber.
//!
//! A finished task yields three sidecar files (`.srt`, `.txt`, `.text`) that
//! are published under a generated name of the form
//! `[<timestamp>][<owner>][<title>][<bvid>]`.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};

use super::task::TaskMetadata;

/// Maximum number of characters kept from a video title
pub const TITLE_MAX_CHARS: usize = 50;

/// Characters that are illegal in Windows or Linux file names
const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sidecar extensions in publishing order
pub const EXTENSIONS: [&str; 3] = ["srt", "txt", "text"];

/// The three files making up one transcription result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub srt: PathBuf,
    pub txt: PathBuf,
    pub text: PathBuf,
}

impl ArtifactSet {
    /// Sidecars sharing a stem inside `dir`
    pub fn in_dir(dir: &Path, stem: &str) -> Self {
        Self {
            srt: dir.join(format!("{}.srt", stem)),
            txt: dir.join(format!("{}.txt", stem)),
            text: dir.join(format!("{}.text", stem)),
        }
    }

    /// Sidecars written next to an audio file (`audio.mp3` -> `audio.srt`, ...)
    pub fn beside(audio_path: &Path) -> Self {
        Self {
            srt: audio_path.with_extension("srt"),
            txt: audio_path.with_extension("txt"),
            text: audio_path.with_extension("text"),
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.srt, &self.txt, &self.text]
    }

    pub fn into_paths(self) -> Vec<PathBuf> {
        vec![self.srt, self.txt, self.text]
    }
}

/// Replace illegal file-name characters with `_` and cap the length
pub fn sanitize_title(title: &str) -> String {
    replace_illegal(title).chars().take(TITLE_MAX_CHARS).collect()
}

fn replace_illegal(value: &str) -> String {
    value
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect()
}

/// Build the artifact file stem for a video.
///
/// The timestamp is the publish date in local time; when the publish date is
/// unknown the current time is used.
pub fn artifact_stem(metadata: &TaskMetadata) -> String {
    let published: DateTime<Local> = metadata
        .pubdate
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|utc| utc.with_timezone(&Local))
        .unwrap_or_else(Local::now);

    let owner = metadata.owner.as_deref().unwrap_or("unknown");
    let title = metadata.title.as_deref().unwrap_or("Untitled");

    format!(
        "[{}][{}][{}][{}]",
        published.format("%Y-%m-%d_%H-%M-%S"),
        replace_illegal(owner),
        sanitize_title(title),
        metadata.bvid
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_illegal_characters() {
        assert_eq!(sanitize_title("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_title(r#"<x>"y"\z|?"#), "_x__y__z__");
    }

    #[test]
    fn test_sanitize_truncates_by_characters() {
        let long = "长".repeat(80);
        let sanitized = sanitize_title(&long);
        assert_eq!(sanitized.chars().count(), TITLE_MAX_CHARS);

        let mixed = format!("{}{}", "a/".repeat(30), "tail");
        let sanitized = sanitize_title(&mixed);
        assert_eq!(sanitized.chars().count(), 50);
        assert!(sanitized.starts_with("a_a_"));
    }

    #[test]
    fn test_artifact_stem_layout() {
        let mut metadata = TaskMetadata::new("BV1GJ411x7h7");
        metadata.owner = Some("up/主".to_string());
        metadata.title = Some("a/b:c*d".to_string());
        metadata.pubdate = Some(1_700_000_000);

        let stem = artifact_stem(&metadata);
        let expected_time = DateTime::<Utc>::from_timestamp(1_700_000_000, 0)
            .unwrap()
            .with_timezone(&Local)
            .format("%Y-%m-%d_%H-%M-%S")
            .to_string();

        assert_eq!(
            stem,
            format!("[{}][up_主][a_b_c_d][BV1GJ411x7h7]", expected_time)
        );
    }

    #[test]
    fn test_artifact_set_paths() {
        let set = ArtifactSet::in_dir(Path::new("/out"), "[x][y][z][BV1]");
        assert_eq!(set.srt, PathBuf::from("/out/[x][y][z][BV1].srt"));
        assert_eq!(set.text, PathBuf::from("/out/[x][y][z][BV1].text"));

        let beside = ArtifactSet::beside(Path::new("/tmp/audio.mp3"));
        assert_eq!(beside.txt, PathBuf::from("/tmp/audio.txt"));
        assert_eq!(beside.paths().len(), EXTENSIONS.len());
    }
}

//! Domain types for the queue.
//!
//! This module contains the data that travels through the repository:
//! - Task: one line of a batch file, JSON metadata or opaque text
//! - Artifact: the sidecar files produced for a finished task
//! - Disposition: how a processed task ended

pub mod artifact;
pub mod disposition;
pub mod task;

// Re-export commonly used types
pub use artifact::{artifact_stem, sanitize_title, ArtifactSet, TITLE_MAX_CHARS};
pub use disposition::Disposition;
pub use task::{Task, TaskMetadata};

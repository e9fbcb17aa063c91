//! sttq - git-backed queue for video transcription jobs
//!
//! A shared git repository is the queue. Producers push batch files of task
//! lines into `to_stt/`; workers take one task at a time, download and
//! transcribe the audio, and push the resulting subtitle and text files into
//! `from_stt/`, where a consumer collects them.
//!
//! # Architecture
//!
//! Git is the only coordination mechanism:
//! - Every read starts with a hard reset to the remote
//! - Every change is one commit; a rejected push means "someone else moved
//!   first", and the whole unit of work is redone on a fresh copy
//! - Network and git calls share one retry policy; running out of attempts
//!   is an error, never an empty answer
//!
//! # Modules
//!
//! - `adapters`: External collaborators (platform API, downloader, whisper)
//! - `core`: Repository, selector, publisher, driver, retry
//! - `domain`: Task lines, result artifacts, dispositions
//! - `config`: `config.json` loading
//! - `cli`: Command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Feed the queue
//! sttq enqueue --resolve https://www.bilibili.com/video/BV1GJ411x7h7
//!
//! # Work through it (three iterations by default)
//! sttq run --max-duration 7200
//!
//! # Pick up the results
//! sttq collect --dest ./transcripts
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use config::QueueConfig;
pub use self::core::{
    DriveOptions, DriveReport, Driver, QueueError, QueueRepository, RetryPolicy, Selection,
    SelectionPolicy,
};
pub use domain::{ArtifactSet, Disposition, Task, TaskMetadata};

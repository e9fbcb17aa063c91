//! Core queue logic.
//!
//! This module contains:
//! - QueueRepository: git clone used as the shared queue
//! - Selector: takes the next task out of the inbox
//! - Publisher: moves results into the outbox and collects them
//! - Driver: pull/process/publish loop
//! - Retry: uniform backoff for git and network calls

pub mod driver;
pub mod error;
pub mod publisher;
pub mod repository;
pub mod retry;
pub mod selector;
pub mod worklist;

// Re-export commonly used types
pub use driver::{Collaborators, DriveOptions, DriveReport, Driver, DriverState, RunLock};
pub use error::QueueError;
pub use publisher::{collect, default_batch_name, enqueue, publish, publish_pending};
pub use repository::{commit_message, Mutation, PushOutcome, QueueRepository};
pub use retry::{retry, retry_if, Backoff, RetryPolicy};
pub use selector::{pending_count, take_next, DurationMode, Selection, SelectionPolicy};
pub use worklist::{DispositionLog, WorkList};

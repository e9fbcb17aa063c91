//! Uniform retry policy for git and network operations.
//!
//! Every call that crosses the network goes through [`retry`] (or a loop
//! driven by [`Backoff`]): a fixed interval between attempts and a fixed
//! attempt budget. When the budget runs out the caller gets
//! [`QueueError::ExhaustedRetries`], never a default value.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use super::error::QueueError;

/// Retry policy shared by git and HTTP operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first; 0 retries forever
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed delay between attempts in seconds
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_max_attempts() -> u32 {
    10
}
fn default_interval_seconds() -> u64 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            interval_seconds: default_interval_seconds(),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval_seconds: u64) -> Self {
        Self {
            max_attempts,
            interval_seconds,
        }
    }

    /// Policy that never gives up on retryable errors
    pub fn unbounded(interval_seconds: u64) -> Self {
        Self::new(0, interval_seconds)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_attempts == 0
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn allows_another(&self, attempts: u32) -> bool {
        self.is_unbounded() || attempts < self.max_attempts
    }
}

/// Attempt bookkeeping for one logical operation
#[derive(Debug)]
pub struct Backoff<'a> {
    policy: &'a RetryPolicy,
    operation: String,
    attempts: u32,
}

impl<'a> Backoff<'a> {
    pub fn new(policy: &'a RetryPolicy, operation: impl Into<String>) -> Self {
        Self {
            policy,
            operation: operation.into(),
            attempts: 0,
        }
    }

    /// Record a failed attempt.
    ///
    /// Sleeps and returns `Ok(())` when another attempt is allowed. Returns
    /// the error itself when it is not retryable, or `ExhaustedRetries` when
    /// the budget is spent.
    pub async fn failed(&mut self, err: QueueError) -> Result<(), QueueError> {
        self.failed_if(err, QueueError::is_retryable).await
    }

    /// Like [`Backoff::failed`] with a caller-supplied retryability test
    pub async fn failed_if<P>(&mut self, err: QueueError, is_retryable: P) -> Result<(), QueueError>
    where
        P: Fn(&QueueError) -> bool,
    {
        self.attempts += 1;

        if !is_retryable(&err) {
            error!(
                operation = %self.operation,
                attempt = self.attempts,
                error = %err,
                "Operation failed with a non-retryable error"
            );
            return Err(err);
        }

        if !self.policy.allows_another(self.attempts) {
            error!(
                operation = %self.operation,
                attempts = self.attempts,
                error = %err,
                "Retry budget exhausted"
            );
            return Err(QueueError::ExhaustedRetries {
                operation: self.operation.clone(),
                attempts: self.attempts,
                last_error: err.to_string(),
            });
        }

        warn!(
            operation = %self.operation,
            attempt = self.attempts,
            max_attempts = self.policy.max_attempts,
            error = %err,
            "Attempt failed, retrying in {}s",
            self.policy.interval_seconds
        );
        tokio::time::sleep(self.policy.interval()).await;
        Ok(())
    }
}

/// Run `op` until it succeeds, the error is not retryable, or the budget is spent
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, operation: &str, op: F) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
{
    retry_if(policy, operation, QueueError::is_retryable, op).await
}

/// [`retry`] with a caller-supplied retryability test
pub async fn retry_if<T, F, Fut, P>(
    policy: &RetryPolicy,
    operation: &str,
    is_retryable: P,
    mut op: F,
) -> Result<T, QueueError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, QueueError>>,
    P: Fn(&QueueError) -> bool,
{
    let mut backoff = Backoff::new(policy, operation);
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) => backoff.failed_if(e, &is_retryable).await?,
        }
    }
}

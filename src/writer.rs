//! Conflict-resolving writer.
//!
//! Wraps an update in a fetch-then-write loop over the provider's content
//! hash. Each attempt re-reads the current sha and content and re-runs the
//! caller's transform on what it just fetched, so a concurrent writer's
//! change is built upon, never overwritten by a replayed stale payload.
//!
//! # States
//!
//! ```text
//! Idle ─▶ Fetching ─▶ Writing ─▶ Done
//!            ▲           │
//!            └─conflict──┤
//!                        └─▶ Failed
//! ```
//!
//! Only [`StoreError::Conflict`] from the write step loops back, and only
//! while attempts remain. Every other error (and a conflict on the last
//! attempt) ends in `Failed` and is returned unchanged.

use std::time::Duration;

use gitshelf_core::error::{Result, StoreError};
use gitshelf_core::models::FileMetadata;
use gitshelf_core::provider::Provider;
use tracing::{debug, info, warn};

use crate::config::RetryConfig;

/// Bound and pacing of conflict retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total write attempts, the first included. At least 1.
    pub max_attempts: u32,
    /// Linear backoff unit: the pause after attempt `n` is `backoff * n`.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Retry without pausing between attempts.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, Duration::from_millis(config.backoff_ms))
    }
}

/// Where a writer is in its update loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriterState {
    Idle,
    Fetching { attempt: u32 },
    Writing { attempt: u32 },
    Done { attempts: u32 },
    Failed { attempts: u32 },
}

/// Result of a successful update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// New concurrency token of the path.
    pub sha: String,
    pub commit_sha: Option<String>,
    /// Write attempts it took, 1 when there was no conflict.
    pub attempts: u32,
    /// The blob that was committed.
    pub content: String,
}

/// Runs one update through the fetch/write/retry state machine.
pub struct ConflictResolvingWriter<'a> {
    provider: &'a dyn Provider,
    policy: RetryPolicy,
    state: WriterState,
}

impl<'a> ConflictResolvingWriter<'a> {
    pub fn new(provider: &'a dyn Provider, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            state: WriterState::Idle,
        }
    }

    pub fn state(&self) -> &WriterState {
        &self.state
    }

    /// Replace the content of `path` with `transform(current)`.
    ///
    /// `transform` is called once per attempt with the freshly fetched file.
    /// An error from it ends the update without writing.
    pub async fn update<F>(
        &mut self,
        path: &str,
        message: &str,
        mut transform: F,
    ) -> Result<WriteOutcome>
    where
        F: FnMut(&FileMetadata) -> Result<String> + Send,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            self.state = WriterState::Fetching { attempt };
            debug!(path, attempt, max_attempts, "fetching current sha");
            let current = match self.provider.get_file_metadata(path).await {
                Ok(current) => current,
                Err(e) => return Err(self.fail(attempt, e)),
            };
            let content = match transform(&current) {
                Ok(content) => content,
                Err(e) => return Err(self.fail(attempt, e)),
            };

            self.state = WriterState::Writing { attempt };
            debug!(path, attempt, max_attempts, sha = %current.sha, "writing");
            match self
                .provider
                .create_or_update(path, &content, message, Some(&current.sha))
                .await
            {
                Ok(result) => {
                    self.state = WriterState::Done { attempts: attempt };
                    info!(path, attempts = attempt, sha = %result.sha, "updated document");
                    return Ok(WriteOutcome {
                        sha: result.sha,
                        commit_sha: result.commit_sha,
                        attempts: attempt,
                        content,
                    });
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(path, attempt, max_attempts, error = %e, "write conflict, retrying");
                    let delay = self.policy.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        warn!(path, attempts = attempt, "write conflict, giving up");
                    }
                    return Err(self.fail(attempt, e));
                }
            }
        }
    }

    fn fail(&mut self, attempts: u32, error: StoreError) -> StoreError {
        self.state = WriterState::Failed { attempts };
        error
    }
}

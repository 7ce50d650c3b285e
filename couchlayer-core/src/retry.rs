//! Bounded retry of transient store failures.
//!
//! Read-style repository operations funnel their store call through [`retry`]. A failure the
//! store marks as transient (see [`StoreError::is_transient`]) re-issues the identical request
//! until the attempt budget is spent. Any other failure, or the last transient one, is wrapped in
//! the operation's [`ErrorKind`] with the store error kept as the cause.

use serde::{Deserialize, Serialize};
use std::{future::Future, time::Duration};
use tracing::warn;

use crate::{
    client::StoreResult,
    error::{DbError, DbResult, ErrorKind},
};

/// Attempt budget used when the caller does not pick one.
pub const DEFAULT_RETRY_ATTEMPTS: usize = 3;

/// Exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Delay before the first retry, doubled for every further one.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay.
    pub max_delay_ms: u64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self { base_delay_ms: 50, max_delay_ms: 1_000 }
    }
}

impl Backoff {
    pub fn new(base_delay_ms: u64, max_delay_ms: u64) -> Self {
        Self { base_delay_ms, max_delay_ms }
    }

    /// Delay before retry number `retry` (zero based).
    pub fn delay(&self, retry: usize) -> Duration {
        let shift = retry.min(63) as u32;
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(1u64 << shift);
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}

/// How many times a transient failure is retried, and how long to wait in between.
///
/// `attempts` counts the first call, so a policy of 1 never retries. A budget of 0 is treated as 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub attempts: usize,
    #[serde(default)]
    pub backoff: Option<Backoff>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: DEFAULT_RETRY_ATTEMPTS, backoff: None }
    }
}

impl RetryPolicy {
    pub fn new(attempts: usize) -> Self {
        Self { attempts, backoff: None }
    }

    pub fn no_retry() -> Self {
        Self::new(1)
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = Some(backoff);
        self
    }

    /// The effective number of attempts, never below 1.
    pub fn max_attempts(&self) -> usize {
        self.attempts.max(1)
    }
}

impl From<usize> for RetryPolicy {
    fn from(attempts: usize) -> Self {
        Self::new(attempts)
    }
}

/// Runs `call` until it succeeds, fails permanently or runs out of attempts.
///
/// Attempts are strictly sequential. `operation` names the call in logs and in the reason of the
/// returned error.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    operation: &str,
    kind: ErrorKind,
    mut call: F,
) -> DbResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < max_attempts => {
                warn!(
                    target: "couchlayer::retry",
                    operation,
                    attempt,
                    max_attempts,
                    error = %err,
                    "transient store failure, retrying"
                );

                if let Some(backoff) = &policy.backoff {
                    tokio::time::sleep(backoff.delay(attempt - 1)).await;
                }
                attempt += 1;
            }
            Err(err) => {
                return Err(DbError::new(kind, format!("Unable to {operation}: {err}")).with_cause(err));
            }
        }
    }
}

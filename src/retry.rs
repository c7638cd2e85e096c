// src/retry.rs

//! Exponential-backoff retry executor.
//!
//! Attempt 0 runs immediately. After a failure the policy either gives up
//! (attempts exhausted, or the retry predicate rejects the error) and returns
//! that error unchanged, or waits
//! `min(base_delay * backoff_factor^attempt, max_delay)` and tries again.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::{error, info, warn};

/// Transient record describing one scheduled retry.
#[derive(Debug)]
pub struct RetryAttempt<'a, E> {
    /// 1-based number of the retry about to happen.
    pub attempt_number: u32,
    /// Backoff delay before that retry.
    pub delay: Duration,
    /// The failure that caused it.
    pub error: &'a E,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

/// 3 retries starting at 2s, capped at 30s. The `[retry]` config section
/// defaults to these values.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(2000),
            max_delay: Duration::from_millis(30_000),
            backoff_factor: 2.0,
        }
    }
}

/// Retry predicate that accepts every error.
pub fn retry_all<E>(_: &E) -> bool {
    true
}

impl RetryPolicy {
    /// Backoff delay after the failure of 0-based `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_factor.max(1.0).powi(attempt as i32);
        let millis = self.base_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `operation`, retrying every failure.
    pub async fn execute<T, E, Op, Fut>(&self, operation: Op) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.execute_if(operation, retry_all).await
    }

    /// Run `operation`, retrying every failure `retry_if` accepts.
    pub async fn execute_if<T, E, Op, Fut, C>(&self, operation: Op, retry_if: C) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        E: Display,
    {
        self.execute_with_hook(operation, retry_if, |_: &RetryAttempt<'_, E>| {
            Ok(None)
        })
        .await
    }

    /// Like [`execute_if`](Self::execute_if), with an `on_retry` hook invoked before
    /// each backoff sleep.
    ///
    /// The hook may ask for an extra wait on top of the backoff delay (used to
    /// honour `retry-after`). A hook error is logged and otherwise ignored.
    pub async fn execute_with_hook<T, E, Op, Fut, C, H>(
        &self,
        mut operation: Op,
        retry_if: C,
        mut on_retry: H,
    ) -> Result<T, E>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
        H: FnMut(&RetryAttempt<'_, E>) -> anyhow::Result<Option<Duration>>,
        E: Display,
    {
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        info!(attempts = attempt + 1, "operation succeeded after retrying");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        error!(
                            attempts = attempt + 1,
                            error = %err,
                            "operation failed; retries exhausted"
                        );
                        return Err(err);
                    }
                    if !retry_if(&err) {
                        error!(error = %err, "operation failed with a non-retryable error");
                        return Err(err);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        event = "retry_scheduled",
                        attempt = attempt + 1,
                        max_attempts = self.max_retries + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "operation failed; retrying"
                    );

                    let record = RetryAttempt {
                        attempt_number: attempt + 1,
                        delay,
                        error: &err,
                    };
                    let extra = match on_retry(&record) {
                        Ok(extra) => extra,
                        Err(hook_err) => {
                            error!(error = %hook_err, "retry hook failed");
                            None
                        }
                    };

                    if let Some(extra) = extra {
                        info!(wait_ms = extra.as_millis() as u64, "waiting before retry as requested");
                        tokio::time::sleep(extra).await;
                    }
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

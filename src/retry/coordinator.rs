// Retry coordinator - re-attempts failed operations with classified backoff
// Author: kelexine (https://github.com/kelexine)

use crate::error::{GuardError, Result};
use crate::metrics;
use crate::retry::policy::RetryPolicy;
use parking_lot::Mutex;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Aggregate retry statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RetryStats {
    /// Calls to `execute_with_retry`.
    pub calls: u64,
    /// Executions of wrapped operations, first attempts included.
    pub executions: u64,
    pub retries: u64,
    pub successes: u64,
    /// Calls that used every attempt and still failed.
    pub exhausted: u64,
    /// Calls stopped by an error the policy refuses to retry.
    pub non_retryable: u64,
    pub cancelled: u64,
}

/// The only component allowed to re-attempt an operation.
#[derive(Default)]
pub struct RetryCoordinator {
    stats: Mutex<RetryStats>,
}

impl RetryCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Execute `operation` with retry logic.
    ///
    /// - Runs at most `policy.max_retries + 1` times; the closure receives the
    ///   0-based attempt number.
    /// - Stops on the first error the policy will not retry.
    /// - Returns the last error once attempts are exhausted.
    /// - Cancellation is observed before each attempt and during backoff.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        operation_name: &str,
        policy: &RetryPolicy,
        idempotent: bool,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.stats.lock().calls += 1;
        let max_attempts = policy.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                self.stats.lock().cancelled += 1;
                return Err(GuardError::Cancelled);
            }

            self.stats.lock().executions += 1;
            let started = Instant::now();
            let error = match operation(attempt).await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!("{} succeeded on attempt {}", operation_name, attempt + 1);
                    }
                    self.stats.lock().successes += 1;
                    return Ok(result);
                }
                Err(error) => error,
            };
            let attempt_elapsed = started.elapsed();

            if matches!(error, GuardError::Cancelled) {
                self.stats.lock().cancelled += 1;
                return Err(error);
            }

            if !policy.should_retry(&error, idempotent) {
                debug!(
                    "{} failed with non-retryable {} after {}ms: {}",
                    operation_name,
                    error.kind(),
                    attempt_elapsed.as_millis(),
                    error.masked_message()
                );
                self.stats.lock().non_retryable += 1;
                return Err(error);
            }

            if attempt + 1 >= max_attempts {
                warn!(
                    "{} failed after {} attempts ({}): {}",
                    operation_name,
                    attempt + 1,
                    error.kind(),
                    error.masked_message()
                );
                self.stats.lock().exhausted += 1;
                return Err(error);
            }

            let delay = policy.delay_for(&error, attempt);
            debug!(
                "{} failed with {} (attempt {}, {}ms), retrying after {}ms",
                operation_name,
                error.kind(),
                attempt + 1,
                attempt_elapsed.as_millis(),
                delay.as_millis()
            );
            self.stats.lock().retries += 1;
            metrics::record_retry(error.kind().as_str());

            if !sleep_or_cancel(delay, cancel).await {
                self.stats.lock().cancelled += 1;
                return Err(GuardError::Cancelled);
            }
            attempt += 1;
        }
    }

    pub fn stats(&self) -> RetryStats {
        self.stats.lock().clone()
    }
}

/// Returns false when cancelled before the delay elapsed.
async fn sleep_or_cancel(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

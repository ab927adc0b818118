//! Deadline enforcement for outbound calls.
//!
//! Every timeout is enforced on the caller side: the guarded future is raced
//! against a timer and dropped when the timer wins. The transport is never
//! trusted to cancel itself.
//!
//! Three layers are configurable independently:
//!
//! - `request`: bounds one whole attempt, end to end.
//! - `connect` and `read`: bound individual phases inside the attempt, via
//!   [`CallScope`]. A phase never outlives the request deadline.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use crate::config::TimeoutSettings;
use crate::error::{GuardError, Result, TimeoutKind};
use parking_lot::RwLock;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Layered timeout settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub read: Duration,
    pub request: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::from(&TimeoutSettings::default())
    }
}

impl From<&TimeoutSettings> for TimeoutConfig {
    fn from(settings: &TimeoutSettings) -> Self {
        Self {
            connect: Duration::from_millis(settings.connect_timeout_ms),
            read: Duration::from_millis(settings.read_timeout_ms),
            request: Duration::from_millis(settings.request_timeout_ms),
        }
    }
}

/// Race `operation` against `duration`.
///
/// On expiry the operation is dropped and a timeout error carries both the
/// configured limit and the time actually spent.
pub async fn with_timeout<F, T>(kind: TimeoutKind, duration: Duration, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let started = Instant::now();
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => result,
        Err(_) => {
            let elapsed = started.elapsed();
            debug!(
                "{} timeout: configured {}ms, elapsed {}ms",
                kind,
                duration.as_millis(),
                elapsed.as_millis()
            );
            Err(GuardError::Timeout {
                kind,
                configured: duration,
                elapsed,
            })
        }
    }
}

/// Per-attempt view of the layered timeouts, handed to the outbound call.
#[derive(Debug, Clone)]
pub struct CallScope {
    config: TimeoutConfig,
    started: Instant,
    deadline: Instant,
}

impl CallScope {
    /// A scope whose request deadline starts now.
    pub fn new(config: TimeoutConfig) -> Self {
        let started = Instant::now();
        Self {
            deadline: started + config.request,
            started,
            config,
        }
    }

    /// Time left until the request deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }

    /// Bound connection establishment.
    pub async fn connect<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.phase(TimeoutKind::Connection, self.config.connect, operation)
            .await
    }

    /// Bound reading the response.
    pub async fn read<F, T>(&self, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.phase(TimeoutKind::Read, self.config.read, operation).await
    }

    async fn phase<F, T>(&self, kind: TimeoutKind, limit: Duration, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let remaining = self.remaining();
        if limit <= remaining {
            return with_timeout(kind, limit, operation).await;
        }

        // The request deadline is the tighter bound, so report it as such.
        match tokio::time::timeout(remaining, operation).await {
            Ok(result) => result,
            Err(_) => Err(GuardError::Timeout {
                kind: TimeoutKind::Request,
                configured: self.config.request,
                elapsed: self.started.elapsed(),
            }),
        }
    }
}

/// Applies the configured timeouts to outbound calls.
pub struct TimeoutGuard {
    config: RwLock<TimeoutConfig>,
}

impl TimeoutGuard {
    pub fn new(config: TimeoutConfig) -> Self {
        Self {
            config: RwLock::new(config),
        }
    }

    pub fn config(&self) -> TimeoutConfig {
        self.config.read().clone()
    }

    pub fn reconfigure(&self, config: TimeoutConfig) {
        *self.config.write() = config;
    }

    /// Bound an arbitrary operation.
    pub async fn with_timeout<F, T>(&self, duration: Duration, operation: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        with_timeout(TimeoutKind::Operation, duration, operation).await
    }

    /// Run one attempt under the request timeout. The operation receives a
    /// [`CallScope`] for its connect and read phases.
    pub async fn run_request<F, Fut, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(CallScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let config = self.config();
        let request = config.request;
        let scope = CallScope::new(config);
        with_timeout(TimeoutKind::Request, request, operation(scope)).await
    }
}

impl Default for TimeoutGuard {
    fn default() -> Self {
        Self::new(TimeoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tokio::time::sleep;

    fn config(connect_ms: u64, read_ms: u64, request_ms: u64) -> TimeoutConfig {
        TimeoutConfig {
            connect: Duration::from_millis(connect_ms),
            read: Duration::from_millis(read_ms),
            request: Duration::from_millis(request_ms),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_within_deadline() {
        let result = with_timeout(TimeoutKind::Operation, Duration::from_millis(100), async {
            sleep(Duration::from_millis(50)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reports_configured_and_elapsed() {
        let result: Result<()> =
            with_timeout(TimeoutKind::Operation, Duration::from_millis(100), async {
                sleep(Duration::from_secs(5)).await;
                Ok(())
            })
            .await;

        match result {
            Err(GuardError::Timeout {
                kind,
                configured,
                elapsed,
            }) => {
                assert_eq!(kind, TimeoutKind::Operation);
                assert_eq!(configured, Duration::from_millis(100));
                assert!(elapsed >= configured);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timed_out_operation_is_abandoned() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);
        let guard = TimeoutGuard::default();
        let _ = guard
            .with_timeout(Duration::from_millis(10), async move {
                sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        sleep(Duration::from_millis(100)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_phase_timeout() {
        let guard = TimeoutGuard::new(config(20, 500, 1_000));
        let result: Result<()> = guard
            .run_request(|scope| async move {
                scope
                    .connect(async {
                        sleep(Duration::from_millis(100)).await;
                        Ok(())
                    })
                    .await
            })
            .await;
        assert!(matches!(
            result,
            Err(GuardError::Timeout {
                kind: TimeoutKind::Connection,
                ..
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_phase_bounded_by_request_deadline() {
        let guard = TimeoutGuard::new(config(50, 10_000, 300));
        let result: Result<()> = guard
            .run_request(|scope| async move {
                scope.connect(async { Ok(()) }).await?;
                sleep(Duration::from_millis(200)).await;
                scope
                    .read(async {
                        sleep(Duration::from_secs(5)).await;
                        Ok(())
                    })
                    .await
            })
            .await;

        match result {
            Err(GuardError::Timeout {
                kind,
                configured,
                elapsed,
            }) => {
                assert_eq!(kind, TimeoutKind::Request);
                assert_eq!(configured, Duration::from_millis(300));
                assert!(elapsed >= Duration::from_millis(300));
            }
            other => panic!("expected request timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_without_phases() {
        let guard = TimeoutGuard::new(config(50, 50, 200));
        let started = Instant::now();
        let result: Result<()> = guard
            .run_request(|_scope| async {
                // Many short steps, none of which trips a phase timeout
                for _ in 0..10 {
                    sleep(Duration::from_millis(40)).await;
                }
                Ok(())
            })
            .await;
        assert!(matches!(
            result,
            Err(GuardError::Timeout {
                kind: TimeoutKind::Request,
                ..
            })
        ));
        assert_eq!(started.elapsed(), Duration::from_millis(200));
    }

    #[test]
    fn test_reconfigure() {
        let guard = TimeoutGuard::default();
        guard.reconfigure(config(1, 2, 3));
        assert_eq!(guard.config().request, Duration::from_millis(3));
    }
}

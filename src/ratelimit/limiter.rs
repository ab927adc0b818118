// Rate limiter - token bucket admission gate for outbound calls
// Author: kelexine (https://github.com/kelexine)

use crate::error::{GuardError, Result};
use crate::metrics;
use crate::ratelimit::bucket::TokenBucket;
use crate::ratelimit::models::{Acquisition, RateLimitConfig, RateLimitStats};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    total_requests: u64,
    granted: u64,
    rejected: u64,
    waited: u64,
    cancelled: u64,
    total_wait: Duration,
}

struct LimiterState {
    bucket: TokenBucket,
    max_wait: Duration,
    counters: Counters,
}

/// First look at the bucket: a grant or a wait. Rejections come back as `Err`.
enum Decision {
    Granted(Acquisition),
    Wait(Duration),
}

/// Token-bucket limiter. Every read-modify-write of the bucket happens under
/// one mutex, which is never held while a caller sleeps.
pub struct RateLimiter {
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            state: Mutex::new(LimiterState {
                bucket: TokenBucket::new(config.capacity, config.refill_rate, Instant::now()),
                max_wait: config.max_wait,
                counters: Counters::default(),
            }),
        }
    }

    /// Take `tokens` without waiting.
    pub fn try_acquire(&self, tokens: f64) -> Result<Acquisition> {
        match self.decide(tokens, false)? {
            Decision::Granted(acquisition) => Ok(acquisition),
            Decision::Wait(wait) => Err(rejection(tokens, wait)),
        }
    }

    /// Take `tokens`, optionally waiting for the bucket to refill.
    ///
    /// A wait longer than the configured maximum is rejected up front with a
    /// retry-after hint. After the wait the bucket is checked once more; if
    /// another caller drained it in the meantime the request is rejected.
    /// Cancellation during the wait ends the call; nothing was reserved, so
    /// nothing is refunded.
    pub async fn acquire(
        &self,
        tokens: f64,
        wait_if_unavailable: bool,
        cancel: &CancellationToken,
    ) -> Result<Acquisition> {
        let started = Instant::now();
        let wait = match self.decide(tokens, wait_if_unavailable)? {
            Decision::Granted(acquisition) => return Ok(acquisition),
            Decision::Wait(wait) => wait,
        };

        debug!("Waiting {}ms for {} rate limit tokens", wait.as_millis(), tokens);
        tokio::select! {
            _ = cancel.cancelled() => {
                let mut state = self.state.lock();
                state.counters.cancelled += 1;
                return Err(GuardError::Cancelled);
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let now = Instant::now();
        let waited = now.saturating_duration_since(started);
        let mut state = self.state.lock();
        state.counters.waited += 1;
        state.counters.total_wait += waited;

        if state.bucket.try_take(tokens, now) {
            state.counters.granted += 1;
            metrics::record_rate_limit(true, waited.as_secs_f64());
            Ok(Acquisition {
                granted: true,
                waited,
                remaining_tokens: state.bucket.tokens(),
            })
        } else {
            state.counters.rejected += 1;
            metrics::record_rate_limit(false, waited.as_secs_f64());
            let retry_after = state.bucket.time_until(tokens);
            warn!("Rate limit tokens taken by another caller during wait");
            Err(rejection(tokens, retry_after))
        }
    }

    fn decide(&self, tokens: f64, wait_if_unavailable: bool) -> Result<Decision> {
        let now = Instant::now();
        let mut state = self.state.lock();

        if !(tokens.is_finite() && tokens > 0.0) {
            return Err(GuardError::Config(format!("cannot acquire {} tokens", tokens)));
        }
        if tokens > state.bucket.capacity() {
            return Err(GuardError::Config(format!(
                "requested {} tokens but bucket capacity is {}",
                tokens,
                state.bucket.capacity()
            )));
        }

        state.counters.total_requests += 1;
        if state.bucket.try_take(tokens, now) {
            state.counters.granted += 1;
            metrics::record_rate_limit(true, 0.0);
            return Ok(Decision::Granted(Acquisition {
                granted: true,
                waited: Duration::ZERO,
                remaining_tokens: state.bucket.tokens(),
            }));
        }

        let wait = state.bucket.time_until(tokens);
        if !wait_if_unavailable || wait > state.max_wait {
            state.counters.rejected += 1;
            metrics::record_rate_limit(false, 0.0);
            debug!(
                "Rate limit rejected {} tokens, {}ms until available",
                tokens,
                wait.as_millis()
            );
            return Err(rejection(tokens, wait));
        }

        Ok(Decision::Wait(wait))
    }

    /// Tokens available right now (after lazy refill).
    pub fn available_tokens(&self) -> f64 {
        let mut state = self.state.lock();
        state.bucket.refill(Instant::now());
        state.bucket.tokens()
    }

    pub fn reconfigure(&self, config: RateLimitConfig) {
        let mut state = self.state.lock();
        state
            .bucket
            .reconfigure(config.capacity, config.refill_rate, Instant::now());
        state.max_wait = config.max_wait;
    }

    pub fn stats(&self) -> RateLimitStats {
        let mut state = self.state.lock();
        state.bucket.refill(Instant::now());
        let c = &state.counters;
        RateLimitStats {
            capacity: state.bucket.capacity(),
            available_tokens: state.bucket.tokens(),
            refill_rate: state.bucket.refill_rate(),
            total_requests: c.total_requests,
            granted: c.granted,
            rejected: c.rejected,
            waited: c.waited,
            cancelled: c.cancelled,
            average_wait_ms: if c.waited == 0 {
                0.0
            } else {
                c.total_wait.as_secs_f64() * 1000.0 / c.waited as f64
            },
        }
    }
}

fn rejection(tokens: f64, retry_after: Duration) -> GuardError {
    GuardError::RateLimited {
        message: format!(
            "{} tokens unavailable, retry in {}ms",
            tokens,
            retry_after.as_millis()
        ),
        retry_after: Some(retry_after),
    }
}

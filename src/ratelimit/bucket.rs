// Token bucket state and refill arithmetic
// Author: kelexine (https://github.com/kelexine)

use std::time::Duration;
use tokio::time::Instant;

/// Slack for float comparisons after refill arithmetic.
const EPSILON: f64 = 1e-9;

/// Token bucket with lazy refill. Callers supply the clock reading so the
/// arithmetic stays deterministic; nothing refills in the background.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A full bucket.
    pub fn new(capacity: f64, refill_rate: f64, now: Instant) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: now,
        }
    }

    /// `tokens = min(capacity, tokens + elapsed * rate)`
    pub fn refill(&mut self, now: Instant) {
        if now <= self.last_refill {
            return;
        }
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }

    /// Refill, then take `amount` tokens if they are all available.
    pub fn try_take(&mut self, amount: f64, now: Instant) -> bool {
        self.refill(now);
        if self.tokens + EPSILON >= amount {
            self.tokens = (self.tokens - amount).max(0.0);
            true
        } else {
            false
        }
    }

    /// How long until `amount` tokens are available, rounded up to whole
    /// milliseconds. Zero when they already are.
    pub fn time_until(&self, amount: f64) -> Duration {
        let deficit = amount - self.tokens;
        if deficit <= EPSILON {
            return Duration::ZERO;
        }
        Duration::from_millis((deficit / self.refill_rate * 1000.0).ceil() as u64)
    }

    /// Change capacity and rate, keeping tokens inside the new capacity.
    pub fn reconfigure(&mut self, capacity: f64, refill_rate: f64, now: Instant) {
        self.refill(now);
        self.capacity = capacity;
        self.refill_rate = refill_rate;
        self.tokens = self.tokens.min(capacity);
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_refill_is_capped() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 5.0, start);
        assert!(bucket.try_take(10.0, start));
        assert_eq!(bucket.tokens(), 0.0);

        bucket.refill(start + Duration::from_millis(400));
        assert!((bucket.tokens() - 2.0).abs() < 1e-9);

        bucket.refill(start + Duration::from_secs(60));
        assert_eq!(bucket.tokens(), 10.0);
    }

    #[test]
    fn test_time_until_rounds_up() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 3.0, start);
        assert!(bucket.try_take(10.0, start));
        // 1 token at 3/s = 333.33ms
        assert_eq!(bucket.time_until(1.0), Duration::from_millis(334));
        assert_eq!(bucket.time_until(0.0), Duration::ZERO);
    }

    #[test]
    fn test_failed_take_leaves_tokens() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(4.0, 1.0, start);
        assert!(!bucket.try_take(5.0, start));
        assert_eq!(bucket.tokens(), 4.0);
    }

    #[test]
    fn test_reconfigure_clamps_tokens() {
        let start = Instant::now();
        let mut bucket = TokenBucket::new(10.0, 1.0, start);
        bucket.reconfigure(3.0, 2.0, start);
        assert_eq!(bucket.tokens(), 3.0);
        assert_eq!(bucket.refill_rate(), 2.0);
    }

    #[test]
    fn test_clock_going_backwards_is_ignored() {
        let start = Instant::now();
        let later = start + Duration::from_secs(1);
        let mut bucket = TokenBucket::new(2.0, 1.0, later);
        assert!(bucket.try_take(2.0, later));
        bucket.refill(start);
        assert_eq!(bucket.tokens(), 0.0);
    }

    proptest! {
        #[test]
        fn tokens_stay_within_bounds(
            capacity in 1.0f64..100.0,
            rate in 0.1f64..50.0,
            steps in proptest::collection::vec((0u64..2_000, 0.0f64..120.0), 1..60),
        ) {
            let start = Instant::now();
            let mut bucket = TokenBucket::new(capacity, rate, start);
            let mut elapsed = 0u64;
            for (advance_ms, amount) in steps {
                elapsed += advance_ms;
                let now = start + Duration::from_millis(elapsed);
                bucket.try_take(amount, now);
                prop_assert!(bucket.tokens() >= 0.0);
                prop_assert!(bucket.tokens() <= bucket.capacity());
            }
        }
    }
}

//! Rate limiter configuration and statistics models.

// Author: kelexine (https://github.com/kelexine)

use crate::config::RateLimitSettings;
use serde::Serialize;
use std::time::Duration;

/// Token bucket settings.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum tokens the bucket holds.
    pub capacity: f64,
    /// Tokens added per second.
    pub refill_rate: f64,
    /// Longest a caller may wait before being rejected outright.
    pub max_wait: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::from(&RateLimitSettings::default())
    }
}

impl From<&RateLimitSettings> for RateLimitConfig {
    fn from(settings: &RateLimitSettings) -> Self {
        Self {
            capacity: settings.capacity,
            refill_rate: settings.refill_rate,
            max_wait: Duration::from_millis(settings.max_wait_ms),
        }
    }
}

/// Outcome of a successful `acquire`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Acquisition {
    pub granted: bool,
    /// Time spent waiting for tokens.
    pub waited: Duration,
    /// Tokens left in the bucket after this grant.
    pub remaining_tokens: f64,
}

/// Aggregate limiter statistics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RateLimitStats {
    pub capacity: f64,
    pub available_tokens: f64,
    pub refill_rate: f64,
    pub total_requests: u64,
    pub granted: u64,
    pub rejected: u64,
    /// Grants or rejections that first had to wait.
    pub waited: u64,
    pub cancelled: u64,
    pub average_wait_ms: f64,
}

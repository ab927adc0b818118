//! Configuration data structures for callgate.
//!
//! Every knob has a serde default so partial files and environment overrides
//! compose cleanly. Durations are expressed in milliseconds.
//!
//! Author: kelexine (<https://github.com/kelexine>)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// The root configuration object.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GuardConfig {
    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Result cache settings.
    #[serde(default)]
    pub cache: CacheSettings,

    /// Token bucket settings.
    #[serde(default)]
    pub rate_limit: RateLimitSettings,

    /// Retry policy knobs.
    #[serde(default)]
    pub retry: RetrySettings,

    /// Admission control settings.
    #[serde(default)]
    pub concurrency: ConcurrencySettings,

    /// Layered timeouts for the outbound call.
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

/// Settings for application logging and output format.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    /// Minimum log level (`trace`, `debug`, `info`, `warn`, `error`).
    /// Default: `info`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format for logs (`pretty`, `json`).
    /// Default: `pretty`
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheSettings {
    /// Turn caching off without touching the other cache settings.
    /// Default: `true`
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Maximum number of live entries.
    /// Default: `500`
    #[serde(default = "default_cache_max_entries")]
    pub max_entries: usize,

    /// TTL applied when a caller does not pass one.
    /// Default: `1800000` (30 minutes)
    #[serde(default = "default_ttl_ms")]
    pub default_ttl_ms: u64,

    /// Fraction of entries evicted when a new key arrives at capacity.
    /// Default: `0.1`
    #[serde(default = "default_eviction_ratio")]
    pub eviction_ratio: f64,

    /// Interval of the background expiry sweep.
    /// Default: `60000`
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RateLimitSettings {
    /// Bucket capacity in tokens.
    /// Default: `10`
    #[serde(default = "default_bucket_capacity")]
    pub capacity: f64,

    /// Tokens added per second.
    /// Default: `1.0`
    #[serde(default = "default_refill_rate")]
    pub refill_rate: f64,

    /// Longest a caller may wait for tokens before being rejected.
    /// Default: `30000`
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySettings {
    /// Retries after the first attempt.
    /// Default: `3`
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default: `1000`
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Default: `100`
    #[serde(default = "default_min_delay_ms")]
    pub min_delay_ms: u64,

    /// Default: `30000`
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Uniform jitter as a fraction of the computed delay.
    /// Default: `0.2`
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Default: `false`
    #[serde(default)]
    pub retry_non_idempotent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencySettings {
    /// Operations allowed to execute at once.
    /// Default: `3`
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Upper bound on `active + queued`.
    /// Default: `50`
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Longest a request may wait for admission.
    /// Default: `30000`
    #[serde(default = "default_queue_timeout_ms")]
    pub queue_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    /// Default: `10000`
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Default: `60000`
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// End-to-end bound on one attempt.
    /// Default: `90000`
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl CacheSettings {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl ConcurrencySettings {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            max_entries: default_cache_max_entries(),
            default_ttl_ms: default_ttl_ms(),
            eviction_ratio: default_eviction_ratio(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: default_bucket_capacity(),
            refill_rate: default_refill_rate(),
            max_wait_ms: default_max_wait_ms(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            min_delay_ms: default_min_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
            retry_non_idempotent: false,
        }
    }
}

impl Default for ConcurrencySettings {
    fn default() -> Self {
        Self {
            max_concurrent_requests: default_max_concurrent(),
            max_queue_size: default_max_queue_size(),
            queue_timeout_ms: default_queue_timeout_ms(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

// Helper functions for serde defaults
fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_max_entries() -> usize {
    500
}

fn default_ttl_ms() -> u64 {
    30 * 60 * 1000
}

fn default_eviction_ratio() -> f64 {
    0.1
}

fn default_sweep_interval_ms() -> u64 {
    60_000
}

fn default_bucket_capacity() -> f64 {
    10.0
}

fn default_refill_rate() -> f64 {
    1.0
}

fn default_max_wait_ms() -> u64 {
    30_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_min_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_factor() -> f64 {
    0.2
}

fn default_max_concurrent() -> usize {
    3
}

fn default_max_queue_size() -> usize {
    50
}

fn default_queue_timeout_ms() -> u64 {
    30_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    60_000
}

fn default_request_timeout_ms() -> u64 {
    90_000
}

//! Cache configuration, entry and statistics models.

// Author: kelexine (https://github.com/kelexine)

use crate::config::CacheSettings;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;

/// Configuration for the request cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled. When disabled every lookup misses and puts are dropped.
    pub enabled: bool,
    /// Maximum number of live entries.
    pub max_entries: usize,
    /// TTL used by `put` when the caller passes none.
    pub default_ttl: Duration,
    /// Fraction of entries evicted when a new key arrives at capacity.
    pub eviction_ratio: f64,
    /// Interval between background expiry sweeps.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    /// Provides default values for cache configuration.
    ///
    /// - `enabled`: true
    /// - `max_entries`: 500
    /// - `default_ttl`: 30 minutes
    /// - `eviction_ratio`: 0.1
    /// - `sweep_interval`: 60 seconds
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

impl From<&CacheSettings> for CacheConfig {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            max_entries: settings.max_entries.max(1),
            default_ttl: settings.default_ttl(),
            eviction_ratio: settings.eviction_ratio,
            sweep_interval: settings.sweep_interval(),
        }
    }
}

/// A stored result and its lifetime.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub payload: Value,
    pub created_at: Instant,
    pub ttl: Duration,
}

impl CacheEntry {
    pub fn new(payload: Value, ttl: Duration) -> Self {
        Self {
            payload,
            created_at: Instant::now(),
            ttl,
        }
    }

    /// Expired once `now - created_at >= ttl`.
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.created_at) >= self.ttl
    }

    pub fn remaining_at(&self, now: Instant) -> Option<Duration> {
        if self.is_expired_at(now) {
            None
        } else {
            Some(self.ttl - now.saturating_duration_since(self.created_at))
        }
    }
}

/// Statistics for cache operations.
#[derive(Debug, Default, Clone, Serialize)]
pub struct CacheStats {
    /// Live entries, including ones expired but not yet swept.
    pub entries: usize,
    pub max_entries: usize,
    /// Number of successful lookups.
    pub hits: u64,
    /// Lookups that found nothing or an expired entry.
    pub misses: u64,
    pub puts: u64,
    /// Entries dropped to make room for new keys.
    pub evictions: u64,
    /// Entries dropped because their TTL ran out.
    pub expirations: u64,
    /// Entries dropped by explicit removal or `clear`.
    pub removals: u64,
    pub hit_rate: f64,
}

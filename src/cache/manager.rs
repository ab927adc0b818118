// Request cache - TTL entries with bounded capacity and LRU-fraction eviction
// Author: kelexine (https://github.com/kelexine)

use crate::cache::models::{CacheConfig, CacheEntry, CacheStats};
use crate::error::{GuardError, Result};
use crate::metrics;
use lru::LruCache;
use parking_lot::Mutex;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct Counters {
    hits: u64,
    misses: u64,
    puts: u64,
    evictions: u64,
    expirations: u64,
    removals: u64,
}

struct CacheState {
    config: CacheConfig,
    // Unbounded on purpose: capacity is enforced by `evict_for_insert`, which
    // drops a fraction of entries at once rather than one per insert.
    entries: LruCache<String, CacheEntry>,
    counters: Counters,
}

impl CacheState {
    fn purge_expired(&mut self, now: Instant) -> usize {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            self.entries.pop(key);
        }
        self.counters.expirations += expired.len() as u64;
        metrics::record_cache_expirations(expired.len());
        expired.len()
    }

    /// Make room for one new key. Expired entries go first; if that frees
    /// nothing, the least recently accessed `eviction_ratio` share is dropped.
    fn evict_for_insert(&mut self, now: Instant) {
        if self.entries.len() < self.config.max_entries {
            return;
        }
        self.purge_expired(now);
        if self.entries.len() < self.config.max_entries {
            return;
        }

        let share = (self.entries.len() as f64 * self.config.eviction_ratio).ceil() as usize;
        let overflow = self.entries.len() + 1 - self.config.max_entries;
        let count = share.max(overflow).max(1);
        let evicted = self.evict_lru(count);
        debug!("Evicted {} least recently used cache entries", evicted);
    }

    fn evict_lru(&mut self, count: usize) -> usize {
        let mut evicted = 0;
        while evicted < count && self.entries.pop_lru().is_some() {
            evicted += 1;
        }
        self.counters.evictions += evicted as u64;
        metrics::record_cache_evictions(evicted);
        evicted
    }
}

/// In-memory result cache shared by every guarded call.
pub struct RequestCache {
    state: Mutex<CacheState>,
}

impl RequestCache {
    /// Create a new cache
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                config,
                entries: LruCache::unbounded(),
                counters: Counters::default(),
            }),
        }
    }

    /// Look up a live entry. Expired entries are removed on the spot.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = Instant::now();
        let mut state = self.state.lock();
        if !state.config.enabled {
            return None;
        }

        let expired = match state.entries.peek(key).map(|entry| entry.is_expired_at(now)) {
            None => {
                state.counters.misses += 1;
                metrics::record_cache_miss();
                return None;
            }
            Some(expired) => expired,
        };

        if expired {
            state.entries.pop(key);
            state.counters.expirations += 1;
            state.counters.misses += 1;
            metrics::record_cache_expirations(1);
            metrics::record_cache_miss();
            metrics::update_cache_entries(state.entries.len());
            return None;
        }

        let payload = state.entries.get(key).map(|entry| entry.payload.clone());
        state.counters.hits += 1;
        metrics::record_cache_hit();
        payload
    }

    /// Store a value. `ttl` falls back to the configured default.
    pub fn put(&self, key: impl Into<String>, value: Value, ttl: Option<Duration>) {
        let key = key.into();
        let now = Instant::now();
        let mut state = self.state.lock();
        if !state.config.enabled {
            return;
        }

        let ttl = ttl.unwrap_or(state.config.default_ttl);
        if !state.entries.contains(&key) {
            state.evict_for_insert(now);
        }
        state.entries.put(key, CacheEntry::new(value, ttl));
        state.counters.puts += 1;
        metrics::record_cache_put();
        metrics::update_cache_entries(state.entries.len());
    }

    /// Typed lookup. A payload that no longer deserializes is a cache error;
    /// callers treat it as a miss.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(payload) => serde_json::from_value(payload)
                .map(Some)
                .map_err(|e| GuardError::Cache(format!("stored value for {} is unreadable: {}", key, e))),
        }
    }

    /// Typed store. Serialization happens before the lock is taken, so a
    /// failure leaves any existing entry untouched.
    pub fn put_as<T: Serialize>(&self, key: impl Into<String>, value: &T, ttl: Option<Duration>) -> Result<()> {
        let payload = serde_json::to_value(value)
            .map_err(|e| GuardError::Cache(format!("value is not serializable: {}", e)))?;
        self.put(key, payload, ttl);
        Ok(())
    }

    /// Whether a live entry exists. Does not refresh recency.
    pub fn exists(&self, key: &str) -> bool {
        let now = Instant::now();
        let state = self.state.lock();
        state.config.enabled
            && state
                .entries
                .peek(key)
                .map(|entry| !entry.is_expired_at(now))
                .unwrap_or(false)
    }

    /// Time left before the entry expires. Does not refresh recency.
    pub fn ttl_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let state = self.state.lock();
        state.entries.peek(key).and_then(|entry| entry.remaining_at(now))
    }

    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.entries.pop(key).is_some();
        if removed {
            state.counters.removals += 1;
            metrics::update_cache_entries(state.entries.len());
        }
        removed
    }

    /// Remove every key matching a wildcard pattern (`*` any run, `?` one char).
    pub fn remove_by_pattern(&self, pattern: &str) -> Result<usize> {
        let matcher = glob_to_regex(pattern)?;
        let mut state = self.state.lock();
        let doomed: Vec<String> = state
            .entries
            .iter()
            .filter(|(key, _)| matcher.is_match(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &doomed {
            state.entries.pop(key);
        }
        state.counters.removals += doomed.len() as u64;
        metrics::update_cache_entries(state.entries.len());
        debug!("Removed {} cache entries matching {}", doomed.len(), pattern);
        Ok(doomed.len())
    }

    /// Drop every entry whose TTL has run out; returns how many were dropped.
    pub fn sweep_expired(&self) -> usize {
        let mut state = self.state.lock();
        let removed = state.purge_expired(Instant::now());
        metrics::update_cache_entries(state.entries.len());
        removed
    }

    /// Clear all cached entries
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.counters.removals += state.entries.len() as u64;
        state.entries.clear();
        metrics::update_cache_entries(0);
        debug!("Cache cleared");
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn default_ttl(&self) -> Duration {
        self.state.lock().config.default_ttl
    }

    pub fn sweep_interval(&self) -> Duration {
        self.state.lock().config.sweep_interval
    }

    /// Apply new settings. Shrinking capacity evicts down to the new bound.
    pub fn reconfigure(&self, config: CacheConfig) {
        let mut state = self.state.lock();
        let max_entries = config.max_entries.max(1);
        state.config = CacheConfig {
            max_entries,
            ..config
        };
        if state.entries.len() > max_entries {
            let excess = state.entries.len() - max_entries;
            state.evict_lru(excess);
        }
        if !state.config.enabled {
            state.entries.clear();
        }
        metrics::update_cache_entries(state.entries.len());
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let c = &state.counters;
        let lookups = c.hits + c.misses;
        CacheStats {
            entries: state.entries.len(),
            max_entries: state.config.max_entries,
            hits: c.hits,
            misses: c.misses,
            puts: c.puts,
            evictions: c.evictions,
            expirations: c.expirations,
            removals: c.removals,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                c.hits as f64 / lookups as f64
            },
        }
    }

    /// Run `sweep_expired` every `interval` until `cancel` fires.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Cache sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        let removed = cache.sweep_expired();
                        if removed > 0 {
                            debug!("Cache sweep removed {} expired entries", removed);
                        }
                    }
                }
            }
        })
    }
}

fn glob_to_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| {
        warn!("Rejected cache pattern {}: {}", pattern, e);
        GuardError::Cache(format!("invalid pattern: {}", e))
    })
}

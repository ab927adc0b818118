// Metrics module for Prometheus observability
// Author: kelexine (https://github.com/kelexine)

mod registry;

pub use registry::{
    gather_metrics,
    ADMISSION_EVENTS,
    ADMISSION_LOAD,
    CACHE_ENTRIES,
    CACHE_OPERATIONS,
    GUARDED_CALLS,
    GUARDED_CALL_DURATION,
    RATE_LIMIT_ACQUISITIONS,
    RATE_LIMIT_WAIT,
    RETRY_ATTEMPTS,
};

/// Helper to record a finished guarded call
pub fn record_call(operation: &str, outcome: &str, duration_secs: f64) {
    GUARDED_CALLS.with_label_values(&[operation, outcome]).inc();
    GUARDED_CALL_DURATION
        .with_label_values(&[operation])
        .observe(duration_secs);
}

/// Helpers to record cache operations
pub fn record_cache_hit() {
    CACHE_OPERATIONS.with_label_values(&["hit"]).inc();
}

pub fn record_cache_miss() {
    CACHE_OPERATIONS.with_label_values(&["miss"]).inc();
}

pub fn record_cache_put() {
    CACHE_OPERATIONS.with_label_values(&["put"]).inc();
}

pub fn record_cache_evictions(count: usize) {
    if count > 0 {
        CACHE_OPERATIONS
            .with_label_values(&["eviction"])
            .inc_by(count as f64);
    }
}

pub fn record_cache_expirations(count: usize) {
    if count > 0 {
        CACHE_OPERATIONS
            .with_label_values(&["expiration"])
            .inc_by(count as f64);
    }
}

pub fn update_cache_entries(count: usize) {
    CACHE_ENTRIES.with_label_values(&["active"]).set(count as f64);
}

/// Helper to record a token bucket decision and how long it took
pub fn record_rate_limit(granted: bool, waited_secs: f64) {
    let outcome = if granted { "granted" } else { "rejected" };
    RATE_LIMIT_ACQUISITIONS.with_label_values(&[outcome]).inc();
    RATE_LIMIT_WAIT
        .with_label_values(&[outcome])
        .observe(waited_secs);
}

/// Helpers to record admission control
pub fn record_admission(event: &str) {
    ADMISSION_EVENTS.with_label_values(&[event]).inc();
}

pub fn update_admission_load(active: usize, queued: usize) {
    ADMISSION_LOAD.with_label_values(&["active"]).set(active as f64);
    ADMISSION_LOAD.with_label_values(&["queued"]).set(queued as f64);
}

/// Helper to record a scheduled retry
pub fn record_retry(error_kind: &str) {
    RETRY_ATTEMPTS.with_label_values(&[error_kind]).inc();
}

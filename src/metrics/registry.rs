// Prometheus metrics registry and collectors
// Author: kelexine (https://github.com/kelexine)

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec_with_registry, register_gauge_vec_with_registry,
    register_histogram_vec_with_registry, CounterVec, Encoder, GaugeVec, HistogramVec, Opts,
    Registry, TextEncoder,
};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // ============================================================================
    // GUARDED CALL METRICS
    // ============================================================================

    /// Guarded calls by outcome
    pub static ref GUARDED_CALLS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("callgate_calls_total", "Total guarded outbound calls"),
        &["operation", "outcome"], // outcome: cache_hit, success, <error kind>
        REGISTRY
    ).unwrap();

    /// End-to-end guarded call duration
    pub static ref GUARDED_CALL_DURATION: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("callgate_call_duration_seconds", "Guarded call duration in seconds")
            .buckets(vec![0.005, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["operation"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // CACHE METRICS
    // ============================================================================

    /// Cache operations
    pub static ref CACHE_OPERATIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("callgate_cache_operations_total", "Total cache operations"),
        &["operation"], // operation: hit, miss, put, eviction, expiration
        REGISTRY
    ).unwrap();

    /// Current cache entries
    pub static ref CACHE_ENTRIES: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("callgate_cache_entries_current", "Current number of cache entries"),
        &["type"], // type: active
        REGISTRY
    ).unwrap();

    // ============================================================================
    // RATE LIMIT METRICS
    // ============================================================================

    /// Token acquisitions by outcome
    pub static ref RATE_LIMIT_ACQUISITIONS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("callgate_rate_limit_acquisitions_total", "Token bucket acquisitions"),
        &["outcome"], // outcome: granted, rejected
        REGISTRY
    ).unwrap();

    /// Time spent waiting for tokens
    pub static ref RATE_LIMIT_WAIT: HistogramVec = register_histogram_vec_with_registry!(
        prometheus::HistogramOpts::new("callgate_rate_limit_wait_seconds", "Token wait duration")
            .buckets(vec![0.0, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["outcome"],
        REGISTRY
    ).unwrap();

    // ============================================================================
    // ADMISSION METRICS
    // ============================================================================

    /// Admission lifecycle events
    pub static ref ADMISSION_EVENTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("callgate_admission_events_total", "Admission control events"),
        &["event"], // event: admitted, rejected, timed_out, cancelled, completed
        REGISTRY
    ).unwrap();

    /// Active and queued operations
    pub static ref ADMISSION_LOAD: GaugeVec = register_gauge_vec_with_registry!(
        Opts::new("callgate_admission_load", "Active and queued operations"),
        &["state"], // state: active, queued
        REGISTRY
    ).unwrap();

    // ============================================================================
    // RETRY METRICS
    // ============================================================================

    /// Retries scheduled, by triggering error kind
    pub static ref RETRY_ATTEMPTS: CounterVec = register_counter_vec_with_registry!(
        Opts::new("callgate_retries_total", "Retries scheduled after a failed attempt"),
        &["error_kind"],
        REGISTRY
    ).unwrap();
}

/// Gather all metrics and return as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

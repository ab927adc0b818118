//! Request and statistics types for the guarded call path.

// Author: kelexine (https://github.com/kelexine)

use crate::cache::{CacheKey, CacheStats};
use crate::concurrency::{ConcurrencyStatus, Priority};
use crate::error::ErrorKind;
use crate::ratelimit::RateLimitStats;
use crate::retry::RetryStats;
use crate::timeout::CallScope;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Where a guarded call currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    CacheLookup,
    RateLimitWait,
    AdmissionWait,
    Executing,
    CacheStore,
    Done,
    Failed(ErrorKind),
    Cancelled,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStage::Idle => f.write_str("idle"),
            PipelineStage::CacheLookup => f.write_str("cache_lookup"),
            PipelineStage::RateLimitWait => f.write_str("rate_limit_wait"),
            PipelineStage::AdmissionWait => f.write_str("admission_wait"),
            PipelineStage::Executing => f.write_str("executing"),
            PipelineStage::CacheStore => f.write_str("cache_store"),
            PipelineStage::Done => f.write_str("done"),
            PipelineStage::Failed(kind) => write!(f, "failed({})", kind),
            PipelineStage::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// One call through the pipeline.
///
/// Built with [`GuardedRequest::new`] and the `with_*` methods:
///
/// ```ignore
/// let request = GuardedRequest::new("summarize")
///     .with_cache_key(key)
///     .with_priority(Priority::High)
///     .with_ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone)]
pub struct GuardedRequest {
    /// Name used in logs, metrics and retry diagnostics.
    pub operation_name: String,
    /// Results are looked up and stored under this key. `None` bypasses the cache.
    pub cache_key: Option<CacheKey>,
    pub priority: Priority,
    /// Rate limit tokens taken by each attempt.
    pub tokens: f64,
    /// Cache TTL for the result; the cache default when `None`.
    pub ttl: Option<Duration>,
    /// Non-idempotent calls are only retried when the policy allows it.
    pub idempotent: bool,
    /// Admission wait limit; the configured queue timeout when `None`.
    pub queue_timeout: Option<Duration>,
    pub cancel: CancellationToken,
}

impl GuardedRequest {
    pub fn new(operation_name: impl Into<String>) -> Self {
        Self {
            operation_name: operation_name.into(),
            cache_key: None,
            priority: Priority::Normal,
            tokens: 1.0,
            ttl: None,
            idempotent: true,
            queue_timeout: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cache_key(mut self, key: CacheKey) -> Self {
        self.cache_key = Some(key);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_tokens(mut self, tokens: f64) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn idempotent(mut self, idempotent: bool) -> Self {
        self.idempotent = idempotent;
        self
    }

    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Handed to the outbound call on every attempt.
#[derive(Debug, Clone)]
pub struct CallContext {
    /// 0-based attempt number.
    pub attempt: u32,
    pub cancel: CancellationToken,
    /// Connect and read phase timeouts, bounded by the request deadline.
    pub scope: CallScope,
}

/// Totals across every guarded call.
#[derive(Debug, Default, Clone, Serialize)]
pub struct PipelineStats {
    pub calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub successes: u64,
    pub failures: u64,
    pub cancelled: u64,
    /// Failed calls by final error kind.
    pub failures_by_kind: BTreeMap<String, u64>,
    pub average_duration_ms: f64,
}

/// Every component's statistics at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct GuardSnapshot {
    pub pipeline: PipelineStats,
    pub cache: CacheStats,
    pub rate_limiter: RateLimitStats,
    pub concurrency: ConcurrencyStatus,
    pub retry: RetryStats,
}

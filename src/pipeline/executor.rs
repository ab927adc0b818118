// Request pipeline - cache, rate limit, admission, timeout and retry in one call path
// Author: kelexine (https://github.com/kelexine)

use crate::cache::{CacheConfig, CacheStats, RequestCache};
use crate::concurrency::{ConcurrencyAdmission, ConcurrencyConfig, ConcurrencyStatus};
use crate::config::GuardConfig;
use crate::error::{GuardError, Result};
use crate::metrics;
use crate::pipeline::models::{CallContext, GuardSnapshot, GuardedRequest, PipelineStage, PipelineStats};
use crate::ratelimit::{RateLimitConfig, RateLimitStats, RateLimiter};
use crate::retry::{RetryCoordinator, RetryPolicy, RetryStats};
use crate::timeout::{TimeoutConfig, TimeoutGuard};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, info, warn, Instrument};

#[derive(Default)]
struct Totals {
    stats: PipelineStats,
    total_duration: Duration,
}

struct Maintenance {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns every guard component for the lifetime of the application.
///
/// A call flows `cache lookup -> (miss) rate limit -> admission -> timeout-bounded
/// execution -> cache store`. The retry coordinator wraps the middle three, so
/// every attempt takes fresh tokens and a fresh admission slot.
pub struct RequestPipeline {
    cache: Arc<RequestCache>,
    rate_limiter: Arc<RateLimiter>,
    admission: Arc<ConcurrencyAdmission>,
    retry: RetryCoordinator,
    timeout: TimeoutGuard,
    retry_policy: RwLock<RetryPolicy>,
    totals: Mutex<Totals>,
    maintenance: Mutex<Option<Maintenance>>,
}

impl RequestPipeline {
    pub fn new(config: &GuardConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            cache: Arc::new(RequestCache::new(CacheConfig::from(&config.cache))),
            rate_limiter: Arc::new(RateLimiter::new(RateLimitConfig::from(&config.rate_limit))),
            admission: Arc::new(ConcurrencyAdmission::new(ConcurrencyConfig::from(
                &config.concurrency,
            ))),
            retry: RetryCoordinator::new(),
            timeout: TimeoutGuard::new(TimeoutConfig::from(&config.timeouts)),
            retry_policy: RwLock::new(RetryPolicy::from(&config.retry)),
            totals: Mutex::new(Totals::default()),
            maintenance: Mutex::new(None),
        })
    }

    /// Run `operation` through every guard.
    ///
    /// A cache hit returns without calling `operation`. On a miss each attempt
    /// takes `request.tokens` from the rate limiter, waits for admission, and
    /// runs under the request timeout; the retry policy decides whether a
    /// failed attempt is repeated. Successful results are cached under
    /// `request.cache_key`. Cache failures never fail the call.
    pub async fn execute_guarded<T, F, Fut>(&self, request: GuardedRequest, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let span = debug_span!(
            "guarded_call",
            operation = %request.operation_name,
            priority = %request.priority
        );
        self.run(request, operation).instrument(span).await
    }

    async fn run<T, F, Fut>(&self, request: GuardedRequest, operation: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        self.totals.lock().stats.calls += 1;

        if request.cancel.is_cancelled() {
            self.finish(&request, started, PipelineStage::Cancelled, false);
            return Err(GuardError::Cancelled);
        }

        if request.cache_key.is_some() {
            if let Some(value) = self.lookup::<T>(&request) {
                self.totals.lock().stats.cache_hits += 1;
                self.finish(&request, started, PipelineStage::Done, true);
                return Ok(value);
            }
            self.totals.lock().stats.cache_misses += 1;
        }

        let operation = Mutex::new(operation);
        let policy = self.retry_policy.read().clone();
        let result = self
            .retry
            .execute_with_retry(
                &request.operation_name,
                &policy,
                request.idempotent,
                &request.cancel,
                |attempt| self.attempt(&request, attempt, &operation),
            )
            .await;

        match result {
            Ok(value) => {
                self.store(&request, &value);
                self.finish(&request, started, PipelineStage::Done, false);
                Ok(value)
            }
            Err(error) => {
                let stage = match error {
                    GuardError::Cancelled => PipelineStage::Cancelled,
                    ref other => PipelineStage::Failed(other.kind()),
                };
                self.finish(&request, started, stage, false);
                Err(error)
            }
        }
    }

    async fn attempt<T, F, Fut>(&self, request: &GuardedRequest, attempt: u32, operation: &Mutex<F>) -> Result<T>
    where
        F: FnMut(CallContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cancel = &request.cancel;

        enter(request, PipelineStage::RateLimitWait, attempt);
        self.rate_limiter.acquire(request.tokens, true, cancel).await?;

        enter(request, PipelineStage::AdmissionWait, attempt);
        self.admission
            .execute(request.priority, request.queue_timeout, cancel, || {
                enter(request, PipelineStage::Executing, attempt);
                self.timeout.run_request(|scope| {
                    let context = CallContext {
                        attempt,
                        cancel: cancel.clone(),
                        scope,
                    };
                    let mut operation = operation.lock();
                    (*operation)(context)
                })
            })
            .await
    }

    fn lookup<T: DeserializeOwned>(&self, request: &GuardedRequest) -> Option<T> {
        let key = request.cache_key.as_ref()?;
        enter(request, PipelineStage::CacheLookup, 0);
        match self.cache.get_as::<T>(key.as_str()) {
            Ok(hit) => hit,
            Err(error) => {
                warn!(
                    "Cache read for {} failed, treating as miss: {}",
                    key,
                    error.masked_message()
                );
                None
            }
        }
    }

    fn store<T: Serialize>(&self, request: &GuardedRequest, value: &T) {
        let Some(key) = request.cache_key.as_ref() else {
            return;
        };
        enter(request, PipelineStage::CacheStore, 0);
        if let Err(error) = self.cache.put_as(key.as_str(), value, request.ttl) {
            warn!(
                "Could not cache result for {}: {}",
                key,
                error.masked_message()
            );
        }
    }

    fn finish(&self, request: &GuardedRequest, started: Instant, stage: PipelineStage, cache_hit: bool) {
        let elapsed = started.elapsed();
        let outcome = match stage {
            PipelineStage::Done if cache_hit => "cache_hit",
            PipelineStage::Done => "success",
            PipelineStage::Cancelled => "cancelled",
            PipelineStage::Failed(kind) => kind.as_str(),
            _ => "unknown",
        };
        metrics::record_call(&request.operation_name, outcome, elapsed.as_secs_f64());

        {
            let mut totals = self.totals.lock();
            totals.total_duration += elapsed;
            match stage {
                PipelineStage::Done => totals.stats.successes += 1,
                PipelineStage::Cancelled => totals.stats.cancelled += 1,
                PipelineStage::Failed(kind) => {
                    totals.stats.failures += 1;
                    *totals
                        .stats
                        .failures_by_kind
                        .entry(kind.as_str().to_string())
                        .or_insert(0) += 1;
                }
                _ => {}
            }
        }

        debug!(
            "{} finished: {} in {}ms",
            request.operation_name,
            stage,
            elapsed.as_millis()
        );
    }

    /// Hot-reload every component. Nothing changes if `config` fails validation.
    pub fn apply_config(&self, config: &GuardConfig) -> Result<()> {
        config.validate()?;
        self.cache.reconfigure(CacheConfig::from(&config.cache));
        self.rate_limiter
            .reconfigure(RateLimitConfig::from(&config.rate_limit));
        self.admission
            .reconfigure(ConcurrencyConfig::from(&config.concurrency));
        self.timeout.reconfigure(TimeoutConfig::from(&config.timeouts));
        *self.retry_policy.write() = RetryPolicy::from(&config.retry);

        // Pick up a changed sweep interval
        let mut maintenance = self.maintenance.lock();
        if let Some(running) = maintenance.take() {
            running.cancel.cancel();
            *maintenance = Some(self.spawn_sweeper());
        }

        info!("Applied new guard configuration");
        Ok(())
    }

    /// Start the background cache sweep. Must be called inside a tokio runtime.
    pub fn start_maintenance(&self) {
        let mut maintenance = self.maintenance.lock();
        if maintenance.is_none() {
            *maintenance = Some(self.spawn_sweeper());
            info!(
                "Cache sweeper started ({}ms interval)",
                self.cache.sweep_interval().as_millis()
            );
        }
    }

    fn spawn_sweeper(&self) -> Maintenance {
        let cancel = CancellationToken::new();
        let handle = self
            .cache
            .spawn_sweeper(self.cache.sweep_interval(), cancel.clone());
        Maintenance { cancel, handle }
    }

    /// Stop background maintenance and wait for it to exit.
    pub async fn shutdown(&self) {
        let maintenance = self.maintenance.lock().take();
        if let Some(running) = maintenance {
            running.cancel.cancel();
            if let Err(e) = running.handle.await {
                warn!("Cache sweeper ended abnormally: {}", e);
            }
        }
        info!("Request pipeline shut down");
    }

    pub fn is_maintenance_running(&self) -> bool {
        self.maintenance.lock().is_some()
    }

    /// Drop cached results whose keys match a `*`/`?` glob.
    pub fn invalidate(&self, pattern: &str) -> Result<usize> {
        self.cache.remove_by_pattern(pattern)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy.read().clone()
    }

    pub fn set_retry_policy(&self, policy: RetryPolicy) {
        *self.retry_policy.write() = policy;
    }

    pub fn cache(&self) -> &Arc<RequestCache> {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn admission(&self) -> &Arc<ConcurrencyAdmission> {
        &self.admission
    }

    pub fn timeout_guard(&self) -> &TimeoutGuard {
        &self.timeout
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn concurrency_status(&self) -> ConcurrencyStatus {
        self.admission.status()
    }

    pub fn rate_limiter_status(&self) -> RateLimitStats {
        self.rate_limiter.stats()
    }

    pub fn retry_stats(&self) -> RetryStats {
        self.retry.stats()
    }

    pub fn stats(&self) -> PipelineStats {
        let totals = self.totals.lock();
        let mut stats = totals.stats.clone();
        let finished = stats.successes + stats.failures + stats.cancelled;
        stats.average_duration_ms = if finished == 0 {
            0.0
        } else {
            totals.total_duration.as_secs_f64() * 1000.0 / finished as f64
        };
        stats
    }

    pub fn snapshot(&self) -> GuardSnapshot {
        GuardSnapshot {
            pipeline: self.stats(),
            cache: self.cache_stats(),
            rate_limiter: self.rate_limiter_status(),
            concurrency: self.concurrency_status(),
            retry: self.retry_stats(),
        }
    }
}

fn enter(request: &GuardedRequest, stage: PipelineStage, attempt: u32) {
    debug!(
        "{} -> {} (attempt {})",
        request.operation_name,
        stage,
        attempt + 1
    );
}

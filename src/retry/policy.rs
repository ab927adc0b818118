// Retry policy - eligibility table and backoff delays per error kind
// Author: kelexine (https://github.com/kelexine)

use crate::config::RetrySettings;
use crate::error::{ErrorKind, GuardError};
use crate::utils::retry::jittered_delay;
use std::collections::HashMap;
use std::time::Duration;

/// How failed attempts are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total executions never exceed `max_retries + 1`.
    pub max_retries: u32,
    pub base_delay: Duration,
    /// Floor applied after jitter.
    pub min_delay: Duration,
    /// Cap applied before jitter, and to server retry hints.
    pub max_delay: Duration,
    /// Uniform jitter as a fraction of the capped delay, in `[0, 1]`.
    pub jitter_factor: f64,
    pub retry_non_idempotent: bool,
    pub retry_on_auth_error: bool,
    pub retry_on_parse_error: bool,
    pub retry_on_unknown_error: bool,
    /// Overrides `base_delay` for specific error kinds.
    pub per_error_kind_base_delay: HashMap<ErrorKind, Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        let base_delay = Duration::from_millis(settings.base_delay_ms);
        Self {
            max_retries: settings.max_retries,
            base_delay,
            min_delay: Duration::from_millis(settings.min_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            jitter_factor: settings.jitter_factor,
            retry_non_idempotent: settings.retry_non_idempotent,
            retry_on_auth_error: false,
            retry_on_parse_error: false,
            retry_on_unknown_error: true,
            per_error_kind_base_delay: default_kind_delays(base_delay),
        }
    }
}

// Rate limits back off harder; local queue pressure clears quickly.
fn default_kind_delays(base_delay: Duration) -> HashMap<ErrorKind, Duration> {
    HashMap::from([
        (ErrorKind::RateLimit, base_delay.saturating_mul(2)),
        (ErrorKind::Backpressure, base_delay / 4),
    ])
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Kind-level eligibility, before idempotency is considered.
    pub fn is_retryable(&self, kind: ErrorKind) -> bool {
        match kind {
            ErrorKind::Network
            | ErrorKind::Server
            | ErrorKind::RateLimit
            | ErrorKind::Timeout
            | ErrorKind::Backpressure => true,
            ErrorKind::Authentication => self.retry_on_auth_error,
            ErrorKind::Parse => self.retry_on_parse_error,
            ErrorKind::Unknown => self.retry_on_unknown_error,
            ErrorKind::BadRequest | ErrorKind::Cancelled | ErrorKind::Cache | ErrorKind::Config => {
                false
            }
        }
    }

    pub fn should_retry(&self, error: &GuardError, idempotent: bool) -> bool {
        (idempotent || self.retry_non_idempotent) && self.is_retryable(error.kind())
    }

    pub fn base_delay_for(&self, kind: ErrorKind) -> Duration {
        self.per_error_kind_base_delay
            .get(&kind)
            .copied()
            .unwrap_or(self.base_delay)
    }

    /// Delay before the retry following failed attempt `attempt` (0-indexed).
    ///
    /// `min(base(kind) * 2^attempt, max_delay)`, jittered, floored at
    /// `min_delay`. A server retry hint replaces the computed value, capped at
    /// `max_delay`.
    pub fn delay_for(&self, error: &GuardError, attempt: u32) -> Duration {
        if let Some(hint) = error.retry_after() {
            return hint.min(self.max_delay);
        }

        let base = self.base_delay_for(error.kind());
        let exponential = 2u32
            .checked_pow(attempt)
            .map(|factor| base.saturating_mul(factor))
            .unwrap_or(self.max_delay);
        let capped = exponential.min(self.max_delay);
        jittered_delay(capped, self.max_delay, self.jitter_factor).max(self.min_delay)
    }
}

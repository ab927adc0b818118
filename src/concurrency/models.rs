//! Admission control models.

// Author: kelexine (https://github.com/kelexine)

use crate::config::ConcurrencySettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Admission priority. Higher priorities are always dispatched first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Dispatch order, highest first.
    pub const ALL: [Priority; 3] = [Priority::High, Priority::Normal, Priority::Low];

    pub(crate) fn index(self) -> usize {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Normal => "normal",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admission limits.
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Operations allowed to execute at once.
    pub max_concurrent: usize,
    /// Upper bound on `active + queued`; beyond it requests are rejected.
    pub max_queue_size: usize,
    /// Wait limit used when a caller does not pass one.
    pub queue_timeout: Duration,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self::from(&ConcurrencySettings::default())
    }
}

impl From<&ConcurrencySettings> for ConcurrencyConfig {
    fn from(settings: &ConcurrencySettings) -> Self {
        Self {
            max_concurrent: settings.max_concurrent_requests.max(1),
            max_queue_size: settings.max_queue_size,
            queue_timeout: settings.queue_timeout(),
        }
    }
}

/// Snapshot of admission counters.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ConcurrencyStatus {
    pub max_concurrent: usize,
    pub max_queue_size: usize,
    pub active: usize,
    pub queued: usize,
    pub queued_high: usize,
    pub queued_normal: usize,
    pub queued_low: usize,
    pub total_submitted: u64,
    pub admitted: u64,
    pub completed: u64,
    pub rejected: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub average_queue_wait_ms: f64,
    /// `active / max_concurrent`
    pub utilization: f64,
}

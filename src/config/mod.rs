// Configuration module
// Author: kelexine (https://github.com/kelexine)

mod models;

pub use models::*;

use crate::error::{GuardError, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

impl GuardConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Environment variables (`CALLGATE_CACHE__MAX_ENTRIES=...`)
    /// 2. Config file (`~/.callgate/config.toml`, optional)
    /// 3. Defaults
    pub fn load() -> Result<Self> {
        Self::build(File::with_name(&Self::default_config_path()).required(false))
    }

    /// Load from an explicit file, still honouring environment overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::build(File::from(path).required(true))
    }

    fn build<S>(file: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let config = Config::builder()
            .add_source(Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix("CALLGATE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| GuardError::Config(e.to_string()))?;

        let loaded: Self = config
            .try_deserialize()
            .map_err(|e| GuardError::Config(e.to_string()))?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject settings that would break component invariants.
    pub fn validate(&self) -> Result<()> {
        let cache = &self.cache;
        if cache.max_entries == 0 {
            return Err(GuardError::Config("cache.max_entries must be positive".into()));
        }
        if !(cache.eviction_ratio > 0.0 && cache.eviction_ratio <= 1.0) {
            return Err(GuardError::Config(
                "cache.eviction_ratio must be in (0, 1]".into(),
            ));
        }

        let rate = &self.rate_limit;
        if !(rate.capacity.is_finite() && rate.capacity >= 1.0) {
            return Err(GuardError::Config("rate_limit.capacity must be >= 1".into()));
        }
        if !(rate.refill_rate.is_finite() && rate.refill_rate > 0.0) {
            return Err(GuardError::Config("rate_limit.refill_rate must be positive".into()));
        }

        let retry = &self.retry;
        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(GuardError::Config("retry.jitter_factor must be in [0, 1]".into()));
        }
        if retry.min_delay_ms > retry.max_delay_ms {
            return Err(GuardError::Config(
                "retry.min_delay_ms must not exceed retry.max_delay_ms".into(),
            ));
        }

        let concurrency = &self.concurrency;
        if concurrency.max_concurrent_requests == 0 {
            return Err(GuardError::Config(
                "concurrency.max_concurrent_requests must be positive".into(),
            ));
        }
        if concurrency.max_queue_size < concurrency.max_concurrent_requests {
            return Err(GuardError::Config(
                "concurrency.max_queue_size must be at least max_concurrent_requests".into(),
            ));
        }

        let timeouts = &self.timeouts;
        if timeouts.request_timeout_ms == 0
            || timeouts.connect_timeout_ms == 0
            || timeouts.read_timeout_ms == 0
        {
            return Err(GuardError::Config("timeouts must be positive".into()));
        }

        Ok(())
    }

    /// Render as TOML, the same format the config file uses.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| GuardError::Config(e.to_string()))
    }

    fn default_config_path() -> String {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".callgate")
            .join("config.toml")
            .to_string_lossy()
            .to_string()
    }
}

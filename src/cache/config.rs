//! Cache configuration.
//!
//! Controls freshness, entry lifetime and sweep cadence via `turnover.toml`.

use std::time::Duration;

const DEFAULT_STALE_TIME_MS: u64 = 5 * 60 * 1000;
const DEFAULT_CACHE_TIME_MS: u64 = 10 * 60 * 1000;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60 * 1000;

/// Cache timings, resolved from `[cache]` settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Age after which `get` treats an entry as a miss.
    pub stale_time: Duration,
    /// Age after which the sweeper deletes an entry that was never refreshed.
    pub cache_time: Duration,
    /// How often the sweeper runs.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_millis(DEFAULT_STALE_TIME_MS),
            cache_time: Duration::from_millis(DEFAULT_CACHE_TIME_MS),
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            stale_time: settings.stale_time,
            cache_time: settings.cache_time,
            sweep_interval: settings.sweep_interval,
        }
    }
}

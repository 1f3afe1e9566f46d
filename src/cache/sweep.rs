//! Periodic eviction of idle cache entries.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::store::ResponseCache;

/// Background task that calls [`ResponseCache::sweep`] on a fixed cadence.
///
/// The task stops when [`CacheSweeper::shutdown`] is awaited or the handle
/// is dropped.
#[derive(Debug)]
pub struct CacheSweeper {
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Start sweeping `cache` every `cache.config().sweep_interval`.
    /// Must be called from within a tokio runtime.
    pub fn spawn(cache: Arc<ResponseCache>) -> Self {
        let every = cache.config().sweep_interval.max(Duration::from_millis(1));
        info!(interval_ms = every.as_millis() as u64, "cache sweeper started");

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                let evicted = cache.sweep();
                debug!(evicted, "cache sweep tick");
            }
        });

        Self {
            handle: Some(handle),
        }
    }

    pub async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
            info!("cache sweeper stopped");
        }
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::config::CacheConfig;

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_after_interval() {
        let clock = Arc::new(ManualClock::starting_now());
        let config = CacheConfig {
            sweep_interval: Duration::from_secs(60),
            ..CacheConfig::default()
        };
        let cache = Arc::new(ResponseCache::new(config, clock.clone()));
        cache.set("rotation", 1_u32);
        clock.advance(Duration::from_millis(600_001));

        let sweeper = CacheSweeper::spawn(cache.clone());
        tokio::task::yield_now().await;
        assert!(cache.contains("rotation"), "first tick is skipped");

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!cache.contains("rotation"));

        sweeper.shutdown().await;
    }
}

//! TurnOver response cache.
//!
//! Client-side cache of API payloads keyed by resource name and filters.
//! Reads distinguish fresh hits from stale data that is still good enough to
//! display while a refetch runs; mutations evict the resources they affect.
//!
//! ## Configuration
//!
//! Cache timings are controlled via `turnover.toml`:
//!
//! ```toml
//! [cache]
//! stale_time_ms = 300000
//! cache_time_ms = 600000
//! sweep_interval_ms = 60000
//! ```

mod clock;
mod config;
pub mod deps;
mod keys;
mod lock;
mod store;
mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use deps::Mutation;
pub use keys::{CacheParams, ResourceKind, build_key};
pub(crate) use lock::{mutex_lock, rw_read, rw_write};
pub use store::{Listener, ResponseCache, Subscription};
pub use sweep::CacheSweeper;

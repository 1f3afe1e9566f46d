//! Client-side caching and session layer for the TurnOver running-shoe
//! rotation tracker.
//!
//! [`cache::ResponseCache`] keeps backend responses keyed by resource and
//! filters, [`session::SessionManager`] owns the token lifecycle and
//! [`resources`] ties both together into cached queries with mutation-aware
//! invalidation.

pub mod app;
pub mod cache;
pub mod client;
pub mod config;
pub mod resources;
pub mod session;
pub mod telemetry;

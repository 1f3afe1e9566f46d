//! Per-resource cached queries and their mutations.
//!
//! Each submodule pairs a [`ResourceFetch`] implementation with the writes
//! that belong to the resource. Queries obtain their cache and API client
//! from the [`SessionManager`](crate::session::SessionManager) they are
//! built with.

pub mod graveyard;
pub mod profile;
mod query;
pub mod recommendations;
pub mod rotation;
pub mod shoes;

pub use graveyard::{GraveyardFetch, GraveyardQuery};
pub use profile::{ProfileEditor, UserStatsFetch, UserStatsQuery};
pub use query::{Epoch, ResourceFetch, ResourceQuery, ResourceState};
pub use recommendations::{
    RecommendationsFetch, RecommendationsQuery, SimilarShoesFetch, SimilarShoesQuery,
};
pub use rotation::{RotationFetch, RotationQuery};
pub use shoes::{ShoesFetch, ShoesQuery};

//! Personalised recommendations and similar-shoe lookups.

use async_trait::async_trait;
use turnover_api_types::{Recommendation, RecommendationResponse};

use super::query::{ResourceFetch, ResourceQuery};
use crate::cache::{CacheParams, ResourceKind};
use crate::client::{ApiClient, ApiError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecommendationsFetch {
    pub category: Option<String>,
    pub limit: Option<u32>,
}

impl RecommendationsFetch {
    pub fn new(category: Option<String>, limit: Option<u32>) -> Self {
        Self {
            category: category.filter(|c| !c.is_empty()),
            limit: limit.filter(|l| *l > 0),
        }
    }
}

#[async_trait]
impl ResourceFetch for RecommendationsFetch {
    type Output = RecommendationResponse;

    const RESOURCE: ResourceKind = ResourceKind::Recommendations;

    fn params(&self) -> CacheParams {
        CacheParams::new()
            .with("category", &self.category)
            .with("limit", self.limit)
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError> {
        api.recommendations(token.unwrap_or_default(), self.category.as_deref(), self.limit)
            .await
    }
}

pub type RecommendationsQuery = ResourceQuery<RecommendationsFetch>;

/// Shoes similar to one catalog entry. Disabled while no shoe is selected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimilarShoesFetch {
    pub shoe_id: String,
    pub limit: Option<u32>,
}

impl SimilarShoesFetch {
    pub fn new(shoe_id: impl Into<String>, limit: Option<u32>) -> Self {
        Self {
            shoe_id: shoe_id.into(),
            limit: limit.filter(|l| *l > 0),
        }
    }
}

#[async_trait]
impl ResourceFetch for SimilarShoesFetch {
    type Output = Vec<Recommendation>;

    const RESOURCE: ResourceKind = ResourceKind::SimilarShoes;

    fn params(&self) -> CacheParams {
        CacheParams::new()
            .with("shoeId", &self.shoe_id)
            .with("limit", self.limit)
    }

    fn enabled(&self) -> bool {
        !self.shoe_id.is_empty()
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError> {
        api.similar_shoes(token.unwrap_or_default(), &self.shoe_id, self.limit)
            .await
    }
}

pub type SimilarShoesQuery = ResourceQuery<SimilarShoesFetch>;

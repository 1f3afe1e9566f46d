//! Retired shoes and their ratings.

use async_trait::async_trait;
use turnover_api_types::{GraveyardFilters, RetireShoeRequest, RetiredShoe, RetiredShoeUpdate};

use super::query::{ResourceFetch, ResourceQuery};
use crate::cache::{CacheParams, Mutation, ResourceKind};
use crate::client::{ApiClient, ApiError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraveyardFetch {
    pub filters: GraveyardFilters,
}

impl GraveyardFetch {
    pub fn new(filters: GraveyardFilters) -> Self {
        Self { filters }
    }
}

#[async_trait]
impl ResourceFetch for GraveyardFetch {
    type Output = Vec<RetiredShoe>;

    const RESOURCE: ResourceKind = ResourceKind::Graveyard;

    fn params(&self) -> CacheParams {
        CacheParams::from_fields(&self.filters)
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError> {
        api.graveyard(token.unwrap_or_default(), &self.filters).await
    }
}

pub type GraveyardQuery = ResourceQuery<GraveyardFetch>;

impl ResourceQuery<GraveyardFetch> {
    /// Retire a shoe. The new entry is appended to this query's data and
    /// cache entry; the rotation and everything derived from it is evicted.
    pub async fn retire_shoe(
        &mut self,
        request: &RetireShoeRequest,
    ) -> Result<Option<RetiredShoe>, ApiError> {
        let request = request.clone();
        self.mutate(
            Mutation::RetireShoe,
            move |api, token| async move { api.retire_shoe(&token, &request).await },
            |graveyard, retired: &RetiredShoe| graveyard.push(retired.clone()),
        )
        .await
    }

    pub async fn update_retired_shoe(
        &mut self,
        graveyard_id: &str,
        update: &RetiredShoeUpdate,
    ) -> Result<Option<RetiredShoe>, ApiError> {
        let id = graveyard_id.to_string();
        let update = update.clone();
        self.mutate(
            Mutation::UpdateRetiredShoe,
            move |api, token| async move { api.update_retired_shoe(&token, &id, &update).await },
            |graveyard, updated: &RetiredShoe| {
                for entry in graveyard.iter_mut() {
                    if entry.graveyard_id == updated.graveyard_id {
                        *entry = updated.clone();
                    }
                }
            },
        )
        .await
    }

    /// `Ok(false)` when signed out.
    pub async fn delete_from_graveyard(&mut self, graveyard_id: &str) -> Result<bool, ApiError> {
        let id = graveyard_id.to_string();
        let deleted = self
            .mutate(
                Mutation::DeleteFromGraveyard,
                move |api, token| async move { api.delete_from_graveyard(&token, &id).await },
                |graveyard, _: &()| graveyard.retain(|s| s.graveyard_id != graveyard_id),
            )
            .await?;
        Ok(deleted.is_some())
    }
}

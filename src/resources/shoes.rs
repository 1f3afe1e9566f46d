//! The shoe catalog. Readable without signing in.

use async_trait::async_trait;
use turnover_api_types::{Shoe, ShoeFilters};

use super::query::{ResourceFetch, ResourceQuery};
use crate::cache::{CacheParams, ResourceKind};
use crate::client::{ApiClient, ApiError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShoesFetch {
    pub filters: ShoeFilters,
}

impl ShoesFetch {
    pub fn new(filters: ShoeFilters) -> Self {
        Self { filters }
    }
}

#[async_trait]
impl ResourceFetch for ShoesFetch {
    type Output = Vec<Shoe>;

    const RESOURCE: ResourceKind = ResourceKind::Shoes;

    fn params(&self) -> CacheParams {
        CacheParams::from_fields(&self.filters)
    }

    fn requires_auth(&self) -> bool {
        false
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError> {
        api.shoes(&self.filters, token).await
    }
}

pub type ShoesQuery = ResourceQuery<ShoesFetch>;

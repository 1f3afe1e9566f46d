//! The runner's active rotation.

use async_trait::async_trait;
use turnover_api_types::{AddToRotationRequest, RotationShoe};

use super::query::{ResourceFetch, ResourceQuery};
use crate::cache::{CacheParams, Mutation, ResourceKind};
use crate::client::{ApiClient, ApiError};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationFetch {
    pub category: Option<String>,
}

impl RotationFetch {
    pub fn new(category: Option<String>) -> Self {
        Self {
            category: category.filter(|c| !c.is_empty()),
        }
    }
}

#[async_trait]
impl ResourceFetch for RotationFetch {
    type Output = Vec<RotationShoe>;

    const RESOURCE: ResourceKind = ResourceKind::Rotation;

    fn params(&self) -> CacheParams {
        CacheParams::new().with("category", &self.category)
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError> {
        let token = token.unwrap_or_default();
        api.rotation(token, self.category.as_deref()).await
    }
}

pub type RotationQuery = ResourceQuery<RotationFetch>;

impl ResourceQuery<RotationFetch> {
    pub async fn add_to_rotation(
        &mut self,
        request: &AddToRotationRequest,
    ) -> Result<Option<RotationShoe>, ApiError> {
        let request = request.clone();
        self.mutate(
            Mutation::AddToRotation,
            move |api, token| async move { api.add_to_rotation(&token, &request).await },
            |rotation, added: &RotationShoe| rotation.push(added.clone()),
        )
        .await
    }

    /// `Ok(false)` when signed out.
    pub async fn remove_from_rotation(&mut self, shoe_id: &str) -> Result<bool, ApiError> {
        let id = shoe_id.to_string();
        let removed = self
            .mutate(
                Mutation::RemoveFromRotation,
                move |api, token| async move { api.remove_from_rotation(&token, &id).await },
                |rotation, _: &()| rotation.retain(|s| s.shoe.id != shoe_id),
            )
            .await?;
        Ok(removed.is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::resources::test_support::{anonymous, envelope, shoe_json, signed_in};

    fn entry(id: &str) -> String {
        format!(
            r#"{{{},"start_date":"2024-03-01T00:00:00Z","user_id":"u1"}}"#,
            shoe_json(id, id)
        )
    }

    #[tokio::test]
    async fn first_mount_fetches_and_caches() {
        let h = signed_in().await;
        let mock = h.server.mock(|when, then| {
            when.method("GET")
                .path("/api/rotation")
                .query_param("category", "daily");
            then.status(200)
                .header("content-type", "application/json")
                .body(envelope(&format!("[{}]", entry("s1"))));
        });

        let mut query = RotationQuery::new(
            Arc::clone(&h.session),
            RotationFetch::new(Some("daily".into())),
        );
        assert_eq!(query.key(), r#"rotation?category="daily""#);

        let first = query.mount();
        assert!(first.is_loading);
        assert!(first.data.is_empty());

        let settled = query.settle().await;
        assert!(!settled.is_loading);
        assert_eq!(settled.data.len(), 1);
        assert_eq!(
            h.cache.get::<Vec<RotationShoe>>(query.key()).map(|v| v.len()),
            Some(1)
        );

        // A second mount in the same episode is served from the cache.
        let again = query.mount();
        assert!(!again.is_loading);
        mock.assert_hits(1);
    }

    #[tokio::test]
    async fn anonymous_mount_skips_fetch() {
        let h = anonymous();
        let mock = h.server.mock(|when, then| {
            when.method("GET").path("/api/rotation");
            then.status(200).body(envelope("[]"));
        });

        let mut query = RotationQuery::new(Arc::clone(&h.session), RotationFetch::default());
        let state = query.mount();

        assert!(!state.is_loading);
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn empty_category_is_no_filter() {
        let h = anonymous();
        let query = RotationQuery::new(
            Arc::clone(&h.session),
            RotationFetch::new(Some(String::new())),
        );
        assert_eq!(query.key(), "rotation");
    }

    #[tokio::test]
    async fn add_then_remove_updates_cache_without_refetch() -> Result<(), ApiError> {
        let h = signed_in().await;
        let list = h.server.mock(|when, then| {
            when.method("GET").path("/api/rotation");
            then.status(200)
                .header("content-type", "application/json")
                .body(envelope(&format!("[{}]", entry("s1"))));
        });
        h.server.mock(|when, then| {
            when.method("POST").path("/api/rotation");
            then.status(201)
                .header("content-type", "application/json")
                .body(envelope(&entry("s2")));
        });
        h.server.mock(|when, then| {
            when.method("DELETE").path("/api/rotation/s1");
            then.status(204);
        });
        h.cache.set("recommendations", 1_u32);

        let mut query = RotationQuery::new(Arc::clone(&h.session), RotationFetch::default());
        query.mount();
        query.settle().await;

        let added = query
            .add_to_rotation(&AddToRotationRequest {
                shoe_id: "s2".into(),
                start_date: None,
            })
            .await?;
        assert_eq!(added.map(|s| s.shoe.id), Some("s2".to_string()));
        assert!(!h.cache.contains("recommendations"));

        assert!(query.remove_from_rotation("s1").await?);
        let cached: Vec<String> = h
            .cache
            .get::<Vec<RotationShoe>>("rotation")
            .unwrap_or_default()
            .into_iter()
            .map(|s| s.shoe.id)
            .collect();
        assert_eq!(cached, vec!["s2".to_string()]);
        list.assert_hits(1);
        Ok(())
    }

    #[tokio::test]
    async fn mutation_before_load_evicts_instead_of_caching_partial_list() -> Result<(), ApiError> {
        let h = signed_in().await;
        h.server.mock(|when, then| {
            when.method("POST").path("/api/rotation");
            then.status(201)
                .header("content-type", "application/json")
                .body(envelope(&entry("s2")));
        });
        h.cache.set("rotation", Vec::<RotationShoe>::new());

        let mut query = RotationQuery::new(Arc::clone(&h.session), RotationFetch::default());
        let added = query
            .add_to_rotation(&AddToRotationRequest {
                shoe_id: "s2".into(),
                start_date: None,
            })
            .await?;

        assert!(added.is_some());
        assert!(!h.cache.contains("rotation"));
        assert!(query.data().is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn add_landing_after_sign_out_is_not_cached() -> Result<(), ApiError> {
        let h = signed_in().await;
        h.server.mock(|when, then| {
            when.method("GET").path("/api/rotation");
            then.status(200)
                .header("content-type", "application/json")
                .body(envelope(&format!("[{}]", entry("s1"))));
        });
        h.server.mock(|when, then| {
            when.method("POST").path("/api/rotation");
            then.status(201)
                .header("content-type", "application/json")
                .delay(Duration::from_millis(300))
                .body(envelope(&entry("s2")));
        });
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signout");
            then.status(204);
        });

        let mut query = RotationQuery::new(Arc::clone(&h.session), RotationFetch::default());
        query.mount();
        query.settle().await;
        assert!(h.cache.contains("rotation"));

        let session = Arc::clone(&h.session);
        let request = AddToRotationRequest {
            shoe_id: "s2".into(),
            start_date: None,
        };
        let (added, _) = tokio::join!(query.add_to_rotation(&request), async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            session.sign_out()
        });

        assert!(added?.is_some());
        assert!(h.cache.is_empty());
        Ok(())
    }
}

//! Profile statistics and profile edits.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;
use turnover_api_types::{UserProfile, UserProfileUpdate, UserStats};

use super::query::{ResourceFetch, ResourceQuery, invalidate_dependents};
use crate::cache::{CacheParams, Mutation, ResourceKind};
use crate::client::{ApiClient, ApiError};
use crate::session::SessionManager;

/// Statistics of one user. Disabled until a user id is known.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserStatsFetch {
    pub user_id: Option<String>,
}

impl UserStatsFetch {
    /// Stats of whoever is signed in to `session` right now.
    pub fn for_session(session: &SessionManager) -> Self {
        Self {
            user_id: session.snapshot().user_id().map(str::to_string),
        }
    }
}

#[async_trait]
impl ResourceFetch for UserStatsFetch {
    type Output = Option<UserStats>;

    const RESOURCE: ResourceKind = ResourceKind::UserStats;

    fn params(&self) -> CacheParams {
        CacheParams::new().with("userId", &self.user_id)
    }

    fn enabled(&self) -> bool {
        self.user_id.is_some()
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError> {
        let Some(user_id) = self.user_id.as_deref() else {
            return Ok(None);
        };
        api.user_stats(token.unwrap_or_default(), user_id)
            .await
            .map(Some)
    }
}

pub type UserStatsQuery = ResourceQuery<UserStatsFetch>;

/// Edits the signed-in user's profile.
#[derive(Debug)]
pub struct ProfileEditor {
    session: Arc<SessionManager>,
    is_updating: bool,
    error: Option<String>,
}

impl ProfileEditor {
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            session,
            is_updating: false,
            error: None,
        }
    }

    pub fn is_updating(&self) -> bool {
        self.is_updating
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Send `update`, fold the server's answer into the session user and
    /// evict cached stats. `Ok(None)` when signed out.
    pub async fn update_profile(
        &mut self,
        update: &UserProfileUpdate,
    ) -> Result<Option<UserProfile>, ApiError> {
        let Some(token) = self.session.valid_token().await else {
            return Ok(None);
        };

        self.is_updating = true;
        self.error = None;
        let result = self.session.api().update_profile(&token, update).await;
        self.is_updating = false;

        match result {
            Ok(profile) => {
                self.session.update_user(&UserProfileUpdate {
                    first_name: Some(profile.first_name.clone()),
                    last_name: Some(profile.last_name.clone()),
                    avg_miles_per_week: Some(profile.avg_miles_per_week),
                    preferred_categories: Some(profile.preferred_categories.clone()),
                });
                invalidate_dependents(self.session.cache(), Mutation::UpdateProfile);
                Ok(Some(profile))
            }
            Err(err) => {
                warn!(error = %err, "profile update failed");
                self.error = Some(err.user_message());
                Err(err)
            }
        }
    }
}

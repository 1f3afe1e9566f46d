use reqwest::Method;
use turnover_api_types::{ApiResponse, UserProfile, UserProfileUpdate, UserStats};

use super::{ApiClient, ApiError, to_body};

impl ApiClient {
    pub async fn profile(&self, token: &str) -> Result<UserProfile, ApiError> {
        let resp: ApiResponse<UserProfile> = self
            .request(Method::GET, "users/me", &[], Some(token), None)
            .await?;
        Ok(resp.data)
    }

    pub async fn update_profile(
        &self,
        token: &str,
        update: &UserProfileUpdate,
    ) -> Result<UserProfile, ApiError> {
        let resp: ApiResponse<UserProfile> = self
            .request(
                Method::PATCH,
                "users/me",
                &[],
                Some(token),
                Some(to_body(update)?),
            )
            .await?;
        Ok(resp.data)
    }

    pub async fn user_stats(&self, token: &str, user_id: &str) -> Result<UserStats, ApiError> {
        let path = format!("users/{user_id}/stats");
        let resp: ApiResponse<UserStats> = self
            .request(Method::GET, &path, &[], Some(token), None)
            .await?;
        Ok(resp.data)
    }
}

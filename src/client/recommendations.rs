use reqwest::Method;
use turnover_api_types::{ApiResponse, Recommendation, RecommendationResponse};

use super::{ApiClient, ApiError};

fn limit_pair(limit: Option<u32>) -> Option<(&'static str, String)> {
    limit.filter(|l| *l > 0).map(|l| ("limit", l.to_string()))
}

impl ApiClient {
    pub async fn recommendations(
        &self,
        token: &str,
        category: Option<&str>,
        limit: Option<u32>,
    ) -> Result<RecommendationResponse, ApiError> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(category) = category.filter(|c| !c.is_empty()) {
            query.push(("category", category.to_string()));
        }
        query.extend(limit_pair(limit));

        let resp: ApiResponse<RecommendationResponse> = self
            .request(Method::GET, "recommendations", &query, Some(token), None)
            .await?;
        Ok(resp.data)
    }

    pub async fn similar_shoes(
        &self,
        token: &str,
        shoe_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<Recommendation>, ApiError> {
        let path = format!("recommendations/similar/{shoe_id}");
        let query: Vec<(&str, String)> = limit_pair(limit).into_iter().collect();
        let resp: ApiResponse<Vec<Recommendation>> = self
            .request(Method::GET, &path, &query, Some(token), None)
            .await?;
        Ok(resp.data)
    }
}

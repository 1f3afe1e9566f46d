use reqwest::Method;
use turnover_api_types::{AddToRotationRequest, ApiResponse, RotationShoe};

use super::{ApiClient, ApiError, to_body};

impl ApiClient {
    pub async fn rotation(
        &self,
        token: &str,
        category: Option<&str>,
    ) -> Result<Vec<RotationShoe>, ApiError> {
        let query: Vec<(&str, String)> = category
            .filter(|c| !c.is_empty())
            .map(|c| ("category", c.to_string()))
            .into_iter()
            .collect();
        let resp: ApiResponse<Vec<RotationShoe>> = self
            .request(Method::GET, "rotation", &query, Some(token), None)
            .await?;
        Ok(resp.data)
    }

    pub async fn add_to_rotation(
        &self,
        token: &str,
        request: &AddToRotationRequest,
    ) -> Result<RotationShoe, ApiError> {
        let resp: ApiResponse<RotationShoe> = self
            .request(
                Method::POST,
                "rotation",
                &[],
                Some(token),
                Some(to_body(request)?),
            )
            .await?;
        Ok(resp.data)
    }

    pub async fn remove_from_rotation(&self, token: &str, shoe_id: &str) -> Result<(), ApiError> {
        let path = format!("rotation/{shoe_id}");
        self.request_unit(Method::DELETE, &path, &[], Some(token), None)
            .await
    }
}

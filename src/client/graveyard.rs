use reqwest::Method;
use turnover_api_types::{
    ApiResponse, GraveyardFilters, RetireShoeRequest, RetiredShoe, RetiredShoeUpdate,
};

use super::{ApiClient, ApiError, to_body};

impl ApiClient {
    pub async fn graveyard(
        &self,
        token: &str,
        filters: &GraveyardFilters,
    ) -> Result<Vec<RetiredShoe>, ApiError> {
        let resp: ApiResponse<Vec<RetiredShoe>> = self
            .request(
                Method::GET,
                "graveyard",
                &filters.query_pairs(),
                Some(token),
                None,
            )
            .await?;
        Ok(resp.data)
    }

    pub async fn retire_shoe(
        &self,
        token: &str,
        request: &RetireShoeRequest,
    ) -> Result<RetiredShoe, ApiError> {
        let resp: ApiResponse<RetiredShoe> = self
            .request(
                Method::POST,
                "graveyard",
                &[],
                Some(token),
                Some(to_body(request)?),
            )
            .await?;
        Ok(resp.data)
    }

    /// The backend reads the changed fields from the query string, not the body.
    pub async fn update_retired_shoe(
        &self,
        token: &str,
        graveyard_id: &str,
        update: &RetiredShoeUpdate,
    ) -> Result<RetiredShoe, ApiError> {
        let path = format!("graveyard/{graveyard_id}");
        let resp: ApiResponse<RetiredShoe> = self
            .request(
                Method::PATCH,
                &path,
                &update.query_pairs(),
                Some(token),
                None,
            )
            .await?;
        Ok(resp.data)
    }

    pub async fn delete_from_graveyard(
        &self,
        token: &str,
        graveyard_id: &str,
    ) -> Result<(), ApiError> {
        let path = format!("graveyard/{graveyard_id}");
        self.request_unit(Method::DELETE, &path, &[], Some(token), None)
            .await
    }
}

use reqwest::Method;
use turnover_api_types::{ApiResponse, Shoe, ShoeFilters};

use super::{ApiClient, ApiError};

impl ApiClient {
    /// Catalog listing. The token is optional; the backend personalises
    /// nothing here but accepts it.
    pub async fn shoes(
        &self,
        filters: &ShoeFilters,
        token: Option<&str>,
    ) -> Result<Vec<Shoe>, ApiError> {
        let resp: ApiResponse<Vec<Shoe>> = self
            .request(Method::GET, "shoes", &filters.query_pairs(), token, None)
            .await?;
        Ok(resp.data)
    }

    pub async fn shoe(&self, shoe_id: &str) -> Result<Shoe, ApiError> {
        let path = format!("shoes/{shoe_id}");
        let resp: ApiResponse<Shoe> = self.request(Method::GET, &path, &[], None, None).await?;
        Ok(resp.data)
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;
    use crate::client::tests::client;

    #[tokio::test]
    async fn filters_become_query_parameters() -> Result<(), ApiError> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/api/shoes")
                .query_param("category", "race")
                .query_param("page", "2")
                .query_param_missing("brand");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"success":true,"data":[]}"#);
        });

        let filters = ShoeFilters {
            category: Some("race".into()),
            page: Some(2),
            ..ShoeFilters::default()
        };
        let shoes = client(&server).shoes(&filters, None).await?;
        assert!(shoes.is_empty());
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn single_shoe_is_unwrapped_from_envelope() -> Result<(), ApiError> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("GET")
                .path("/api/shoes/s7")
                .header_missing("authorization");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"success":true,"data":{"id":"s7","brand":"Brand","name":"Tempo","category":"tempo","tags":["plate"],"weight":210,"drop":8,"stack_height_heel":36,"stack_height_forefoot":28}}"#);
        });

        let shoe = client(&server).shoe("s7").await?;
        assert_eq!(shoe.id, "s7");
        assert_eq!(shoe.name, "Tempo");
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn unknown_shoe_reports_backend_detail() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("GET").path("/api/shoes/missing");
            then.status(404)
                .header("content-type", "application/json")
                .body(r#"{"detail":"Shoe not found"}"#);
        });

        let err = client(&server).shoe("missing").await.expect_err("404");
        assert_eq!(err.user_message(), "Shoe not found");
    }
}

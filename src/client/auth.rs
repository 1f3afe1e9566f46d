use reqwest::Method;
use turnover_api_types::{
    AuthTokenResponse, RefreshRequest, SignInRequest, SignUpRequest, SignUpResponse,
};

use super::{ApiClient, ApiError, to_body};

impl ApiClient {
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpResponse, ApiError> {
        self.request(Method::POST, "auth/signup", &[], None, Some(to_body(request)?))
            .await
    }

    pub async fn sign_in(&self, request: &SignInRequest) -> Result<AuthTokenResponse, ApiError> {
        self.request(Method::POST, "auth/signin", &[], None, Some(to_body(request)?))
            .await
    }

    /// Exchange a refresh token for a new token pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokenResponse, ApiError> {
        let body = to_body(&RefreshRequest {
            refresh_token: refresh_token.to_string(),
        })?;
        self.request(Method::POST, "auth/refresh", &[], None, Some(body))
            .await
    }

    pub async fn sign_out(&self, token: &str) -> Result<(), ApiError> {
        self.request_unit(Method::POST, "auth/signout", &[], Some(token), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use httpmock::MockServer;

    use super::*;
    use crate::client::tests::client;

    #[tokio::test]
    async fn sign_in_posts_credentials() -> Result<(), ApiError> {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method("POST")
                .path("/api/auth/signin")
                .json_body(serde_json::json!({ "email": "a@b.c", "password": "pw" }));
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"access_token":"at","token_type":"bearer","expires_in":3600,"refresh_token":"rt"}"#);
        });

        let tokens = client(&server)
            .sign_in(&SignInRequest {
                email: "a@b.c".into(),
                password: "pw".into(),
            })
            .await?;
        assert_eq!(tokens.access_token, "at");
        assert_eq!(tokens.expires_in, 3600);
        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_may_require_confirmation() -> Result<(), ApiError> {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/api/auth/signup");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"token_type":"bearer","requires_confirmation":true,"message":"check mail"}"#);
        });

        let response = client(&server)
            .sign_up(&SignUpRequest {
                email: "a@b.c".into(),
                password: "pw".into(),
                first_name: "A".into(),
                last_name: "B".into(),
            })
            .await?;
        assert!(response.requires_confirmation);
        assert!(response.tokens().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_rejection_is_an_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST")
                .path("/api/auth/refresh")
                .json_body(serde_json::json!({ "refresh_token": "old" }));
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"detail":"Refresh token expired"}"#);
        });

        let err = client(&server)
            .refresh("old")
            .await
            .expect_err("refresh should fail");
        assert!(err.is_unauthorized());
    }
}

//! REST client for the TurnOver backend.
//!
//! Thin wrapper over `reqwest`: every endpoint lives under `/api`, answers
//! with the `{ data, success, message? }` envelope and reports failures as a
//! JSON body carrying `detail`. Endpoint methods are grouped per resource in
//! the submodules.

mod auth;
mod graveyard;
mod recommendations;
mod rotation;
mod shoes;
mod users;

use std::time::Duration;

use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

const FALLBACK_DETAIL: &str = "An error occurred";

#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx answer. `data` is the parsed body, or `{"detail": <reason>}`
    /// when the body was not JSON.
    #[error("{detail} (status {status})")]
    Status {
        status: StatusCode,
        detail: String,
        data: Value,
    },
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("failed to parse response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl ApiError {
    /// Message suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Status { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(err) => err.status(),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(StatusCode::UNAUTHORIZED)
    }
}

/// Shared HTTP client. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    base: Url,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()?;
        Ok(Self { http, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("turnover/", env!("CARGO_PKG_VERSION"))
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// Absolute URL for an `/api`-relative path such as `rotation/abc`.
    pub fn url(&self, path: &str, query: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = self.base.join("api/")?.join(path)?;
        if !query.is_empty() {
            url.set_query(None);
            let mut pairs = url.query_pairs_mut();
            for (name, value) in query {
                pairs.append_pair(name, value);
            }
        }
        Ok(url)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<Response, ApiError> {
        let url = self.url(path, query)?;
        debug!(method = %method, url = %url, authenticated = token.is_some(), "api request");

        let mut req = self.http.request(method, url);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let bytes = resp.bytes().await?;
        Err(status_error(status, &bytes))
    }

    /// Request returning a JSON body.
    pub(crate) async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let resp = self.send(method, path, query, token, body).await?;
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(ApiError::Decode)
    }

    /// Request whose body, if any, is ignored (204 and friends).
    pub(crate) async fn request_unit(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        token: Option<&str>,
        body: Option<Value>,
    ) -> Result<(), ApiError> {
        self.send(method, path, query, token, body).await?;
        Ok(())
    }
}

fn status_error(status: StatusCode, body: &[u8]) -> ApiError {
    let reason = status.canonical_reason().unwrap_or("Unknown status");
    let data = serde_json::from_slice::<Value>(body)
        .unwrap_or_else(|_| serde_json::json!({ "detail": reason }));

    let detail = match data.get("detail") {
        Some(Value::String(text)) if !text.is_empty() => text.clone(),
        Some(Value::Null | Value::Bool(false) | Value::String(_)) | None => {
            FALLBACK_DETAIL.to_string()
        }
        Some(other) => other.to_string(),
    };

    ApiError::Status {
        status,
        detail,
        data,
    }
}

pub(crate) fn to_body<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(ApiError::Decode)
}

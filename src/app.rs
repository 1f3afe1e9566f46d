//! Composition root: wires the cache, API client and session together.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::cache::{CacheConfig, CacheSweeper, ResponseCache, SystemClock};
use crate::client::{ApiClient, ApiError};
use crate::config::{LoadError, Settings};
use crate::session::{
    FileCredentialStore, RefreshLoop, SessionConfig, SessionError, SessionManager,
};

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] LoadError),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),
    #[error("{0}")]
    Validation(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("not signed in; run `turnover auth sign-in` first")]
    NotAuthenticated,
}

impl AppError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Text suitable for the terminal; backend details win over transport
    /// noise.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Api(err) => err.user_message(),
            AppError::Session(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Long-lived services of one process.
#[derive(Debug)]
pub struct App {
    cache: Arc<ResponseCache>,
    session: Arc<SessionManager>,
    sweeper: Option<CacheSweeper>,
    refresh_loop: Option<RefreshLoop>,
}

impl App {
    /// Build the services from resolved settings. Background tasks are not
    /// started; see [`App::start_background`].
    pub fn build(settings: &Settings) -> Result<Self, AppError> {
        let clock = Arc::new(SystemClock);
        let cache = Arc::new(ResponseCache::new(
            CacheConfig::from(&settings.cache),
            clock.clone(),
        ));
        let api = ApiClient::new(settings.api.base_url.as_str(), settings.api.timeout)?;
        let session_config = SessionConfig::from(&settings.session);
        let store = Arc::new(FileCredentialStore::new(
            session_config.credentials_path.clone(),
        ));
        debug!(
            base_url = %api.base_url(),
            credentials = %store.path().display(),
            "application services built"
        );

        let session = Arc::new(SessionManager::new(
            api,
            Arc::clone(&cache),
            store,
            clock,
            session_config,
        ));

        Ok(Self {
            cache,
            session,
            sweeper: None,
            refresh_loop: None,
        })
    }

    /// Start the cache sweeper and the periodic token check. Requires a
    /// tokio runtime.
    pub fn start_background(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(CacheSweeper::spawn(Arc::clone(&self.cache)));
        }
        if self.refresh_loop.is_none() {
            self.refresh_loop = Some(self.session.spawn_refresh_loop());
        }
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub async fn shutdown(mut self) {
        if let Some(refresh_loop) = self.refresh_loop.take() {
            refresh_loop.shutdown().await;
        }
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.shutdown().await;
        }
        info!("application stopped");
    }
}

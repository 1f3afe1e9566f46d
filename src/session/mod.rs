//! Authentication session.
//!
//! Tracks who is signed in, keeps the access token fresh and guarantees that
//! no cached data survives a change of identity.

mod manager;
mod store;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use turnover_api_types::{UserProfile, UserProfileUpdate};

use crate::client::ApiError;

pub use manager::{RefreshLoop, SessionManager, SignUpOutcome};
pub use store::{
    CredentialStore, Credentials, FileCredentialStore, MemoryCredentialStore, REFRESH_TOKEN_KEY,
    StoreError, TOKEN_EXPIRY_KEY, TOKEN_KEY,
};

pub const DEFAULT_CONFIRMATION_MESSAGE: &str = "Please check your email to confirm your account.";

const DEFAULT_REFRESH_MARGIN_SECS: u64 = 5 * 60;
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
const DEFAULT_CREDENTIALS_PATH: &str = ".turnover/credentials.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    Refreshing,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Anonymous => "anonymous",
            SessionPhase::Authenticating => "authenticating",
            SessionPhase::Authenticated => "authenticated",
            SessionPhase::Refreshing => "refreshing",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub user: Option<UserProfile>,
    #[serde(skip)]
    pub token: Option<String>,
    pub is_authenticated: bool,
    pub phase: SessionPhase,
}

impl Session {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.user_id.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sign-up response did not include a complete token set")]
    MissingTokens,
    #[error("not signed in")]
    NotAuthenticated,
}

impl SessionError {
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }
}

/// Session timings and credential location, resolved from `[session]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Refresh once less than this remains before expiry.
    pub refresh_margin: Duration,
    /// Cadence of the background expiry check.
    pub check_interval: Duration,
    pub credentials_path: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_margin: Duration::from_secs(DEFAULT_REFRESH_MARGIN_SECS),
            check_interval: Duration::from_secs(DEFAULT_CHECK_INTERVAL_SECS),
            credentials_path: PathBuf::from(DEFAULT_CREDENTIALS_PATH),
        }
    }
}

impl From<&crate::config::SessionSettings> for SessionConfig {
    fn from(settings: &crate::config::SessionSettings) -> Self {
        Self {
            refresh_margin: settings.refresh_margin,
            check_interval: settings.check_interval,
            credentials_path: settings.credentials_path.clone(),
        }
    }
}

pub(crate) fn apply_profile_update(user: &mut UserProfile, update: &UserProfileUpdate) {
    if let Some(first_name) = &update.first_name {
        user.first_name = first_name.clone();
    }
    if let Some(last_name) = &update.last_name {
        user.last_name = last_name.clone();
    }
    if let Some(miles) = update.avg_miles_per_week {
        user.avg_miles_per_week = miles;
    }
    if let Some(categories) = &update.preferred_categories {
        user.preferred_categories = categories.clone();
    }
}

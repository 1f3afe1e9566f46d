use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use metrics::counter;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};
use turnover_api_types::{
    AuthTokenResponse, SignInRequest, SignUpRequest, UserProfile, UserProfileUpdate,
};

use super::store::{CredentialStore, Credentials, REFRESH_TOKEN_KEY, load_expiry};
use super::{
    DEFAULT_CONFIRMATION_MESSAGE, Session, SessionConfig, SessionError, SessionPhase,
    apply_profile_update,
};
use crate::cache::{Clock, ResponseCache, rw_read, rw_write};
use crate::client::ApiClient;

const SOURCE: &str = "session::manager";

const METRIC_REFRESH: &str = "turnover_session_refresh_total";
const METRIC_REFRESH_FAILED: &str = "turnover_session_refresh_failed_total";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn,
    ConfirmationRequired { message: String },
}

#[derive(Debug)]
struct SessionState {
    phase: SessionPhase,
    user: Option<UserProfile>,
    token: Option<String>,
}

impl SessionState {
    fn anonymous() -> Self {
        Self {
            phase: SessionPhase::Anonymous,
            user: None,
            token: None,
        }
    }
}

/// Owns the token lifecycle and the link between identity and cache
/// contents.
///
/// Every transition into [`SessionPhase::Anonymous`] and every change of
/// signed-in identity clears the [`ResponseCache`].
#[derive(Debug)]
pub struct SessionManager {
    api: ApiClient,
    cache: Arc<ResponseCache>,
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    state: RwLock<SessionState>,
    refresh_gate: AsyncMutex<()>,
    identity: AtomicU64,
}

impl SessionManager {
    pub fn new(
        api: ApiClient,
        cache: Arc<ResponseCache>,
        store: Arc<dyn CredentialStore>,
        clock: Arc<dyn Clock>,
        config: SessionConfig,
    ) -> Self {
        Self {
            api,
            cache,
            store,
            clock,
            config,
            state: RwLock::new(SessionState::anonymous()),
            refresh_gate: AsyncMutex::new(()),
            identity: AtomicU64::new(0),
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn snapshot(&self) -> Session {
        let state = rw_read(&self.state, SOURCE, "snapshot");
        Session {
            user: state.user.clone(),
            token: state.token.clone(),
            is_authenticated: state.token.is_some() && state.user.is_some(),
            phase: state.phase,
        }
    }

    /// Generation of the identity the cache currently belongs to. It moves
    /// on every cache-clearing transition; a response fetched under an older
    /// generation must not be cached.
    pub fn identity_generation(&self) -> u64 {
        self.identity.load(Ordering::SeqCst)
    }

    pub fn is_current_identity(&self, generation: u64) -> bool {
        self.identity_generation() == generation
    }

    pub fn phase(&self) -> SessionPhase {
        rw_read(&self.state, SOURCE, "phase").phase
    }

    /// Token currently held, without checking its expiry.
    pub fn current_token(&self) -> Option<String> {
        rw_read(&self.state, SOURCE, "current_token").token.clone()
    }

    /// True once less than the refresh margin remains before the stored
    /// expiry. A missing expiry counts as expired.
    pub fn refresh_due(&self) -> Result<bool, SessionError> {
        let expires_at = load_expiry(self.store.as_ref())?;
        let margin = i64::try_from(self.config.refresh_margin.as_millis()).unwrap_or(i64::MAX);
        Ok(self.clock.now_millis() > expires_at.saturating_sub(margin))
    }

    fn set_phase(&self, phase: SessionPhase) -> SessionPhase {
        let mut state = rw_write(&self.state, SOURCE, "set_phase");
        let previous = state.phase;
        state.phase = phase;
        if previous != phase {
            debug!(from = %previous, to = %phase, "session phase changed");
        }
        previous
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Rebuild the session from persisted credentials.
    ///
    /// Refreshes first when the stored token is due; otherwise loads the
    /// profile with the stored token, falling back to a refresh if that
    /// fails.
    #[instrument(skip(self))]
    pub async fn restore(&self) -> Result<Session, SessionError> {
        let Some(credentials) = Credentials::load(self.store.as_ref())? else {
            debug!("no stored credentials");
            return Ok(self.snapshot());
        };

        if self.refresh_due()? {
            info!("stored token is due; refreshing");
            self.refresh().await?;
            return Ok(self.snapshot());
        }

        match self.api.profile(&credentials.access_token).await {
            Ok(user) => {
                info!(user_id = %user.user_id, "session restored");
                let mut state = rw_write(&self.state, SOURCE, "restore");
                *state = SessionState {
                    phase: SessionPhase::Authenticated,
                    user: Some(user),
                    token: Some(credentials.access_token),
                };
            }
            Err(err) => {
                warn!(error = %err, "stored token rejected; trying refresh");
                if self.refresh().await?.is_none() {
                    self.clear_auth();
                }
            }
        }
        Ok(self.snapshot())
    }

    // ========================================================================
    // Sign-in / sign-up / sign-out
    // ========================================================================

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, SessionError> {
        let previous = self.set_phase(SessionPhase::Authenticating);
        let request = SignInRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let tokens = match self.api.sign_in(&request).await {
            Ok(tokens) => tokens,
            Err(err) => {
                self.set_phase(previous);
                return Err(err.into());
            }
        };

        self.establish(&tokens, true).await?;
        info!("signed in");
        Ok(self.snapshot())
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn sign_up(&self, request: &SignUpRequest) -> Result<SignUpOutcome, SessionError> {
        let previous = self.set_phase(SessionPhase::Authenticating);

        let response = match self.api.sign_up(request).await {
            Ok(response) => response,
            Err(err) => {
                self.set_phase(previous);
                return Err(err.into());
            }
        };

        if response.requires_confirmation || response.access_token.is_none() {
            self.set_phase(previous);
            let message = response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_CONFIRMATION_MESSAGE.to_string());
            info!("sign-up awaits email confirmation");
            return Ok(SignUpOutcome::ConfirmationRequired { message });
        }

        let Some(tokens) = response.tokens() else {
            self.set_phase(previous);
            return Err(SessionError::MissingTokens);
        };
        self.establish(&tokens, true).await?;
        info!("signed up");
        Ok(SignUpOutcome::SignedIn)
    }

    /// Drop the session locally right away; the server is told in the
    /// background and its answer is ignored.
    ///
    /// The returned handle lets short-lived callers wait for the
    /// notification before exiting.
    pub fn sign_out(&self) -> Option<JoinHandle<()>> {
        let token = self.current_token();
        self.clear_auth();
        info!("signed out");

        let token = token?;
        let api = self.api.clone();
        Some(tokio::spawn(async move {
            if let Err(err) = api.sign_out(&token).await {
                debug!(error = %err, "server sign-out failed; ignored");
            }
        }))
    }

    /// Merge a partial profile change into the signed-in user.
    pub fn update_user(&self, update: &UserProfileUpdate) {
        let mut state = rw_write(&self.state, SOURCE, "update_user");
        if let Some(user) = state.user.as_mut() {
            apply_profile_update(user, update);
        }
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Returns the new access token, or `None` when there is no refresh token
    /// or the exchange failed. A failed exchange ends the session.
    pub async fn refresh(&self) -> Result<Option<String>, SessionError> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Refresh only if the token is due. Callers that queued behind another
    /// refresh see its new expiry and skip the exchange.
    async fn refresh_if_due(&self) -> Result<Option<String>, SessionError> {
        let _gate = self.refresh_gate.lock().await;
        if !self.refresh_due()? {
            return Ok(self.current_token());
        }
        self.refresh_locked().await
    }

    #[instrument(skip(self))]
    async fn refresh_locked(&self) -> Result<Option<String>, SessionError> {
        let Some(refresh_token) = self.store.get(REFRESH_TOKEN_KEY)? else {
            if self.current_token().is_some() {
                warn!("refresh token missing from the credential store; ending session");
                self.clear_auth();
            }
            return Ok(None);
        };

        let previous = self.set_phase(SessionPhase::Refreshing);
        match self.api.refresh(&refresh_token).await {
            Ok(tokens) => {
                if let Err(err) = self.establish(&tokens, false).await {
                    counter!(METRIC_REFRESH_FAILED).increment(1);
                    warn!(error = %err, "profile load after refresh failed");
                    return match err {
                        SessionError::Store(_) => Err(err),
                        _ => Ok(None),
                    };
                }
                counter!(METRIC_REFRESH).increment(1);
                info!("access token refreshed");
                Ok(Some(tokens.access_token))
            }
            Err(err) => {
                counter!(METRIC_REFRESH_FAILED).increment(1);
                warn!(error = %err, from = %previous, "token refresh failed; ending session");
                self.clear_auth();
                Ok(None)
            }
        }
    }

    /// Periodic check: refresh an authenticated session that is due.
    ///
    /// Returns whether a refresh happened and succeeded.
    pub async fn check_and_refresh(&self) -> Result<bool, SessionError> {
        if !self.snapshot().is_authenticated || !self.refresh_due()? {
            return Ok(false);
        }
        let before = self.current_token();
        let after = self.refresh_if_due().await?;
        Ok(after.is_some() && after != before)
    }

    /// A token safe to send right now, refreshing first when due. `None`
    /// when signed out or when the refresh ended the session.
    pub async fn valid_token(&self) -> Option<String> {
        self.current_token()?;
        let due = match self.refresh_due() {
            Ok(due) => due,
            Err(err) => {
                warn!(error = %err, "cannot read token expiry");
                return None;
            }
        };
        if !due {
            return self.current_token();
        }
        match self.refresh_if_due().await {
            Ok(token) => token,
            Err(err) => {
                warn!(error = %err, "on-demand refresh failed");
                None
            }
        }
    }

    /// Start the periodic expiry check. The loop stops when the returned
    /// handle is dropped.
    pub fn spawn_refresh_loop(self: &Arc<Self>) -> RefreshLoop {
        let manager = Arc::clone(self);
        let every = self.config.check_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await; // Skip the first immediate tick
            loop {
                interval.tick().await;
                if let Err(err) = manager.check_and_refresh().await {
                    warn!(error = %err, "session check failed");
                }
            }
        });
        RefreshLoop {
            handle: Some(handle),
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Persist `tokens`, load the profile and become authenticated.
    ///
    /// `fresh_identity` clears the cache up front (sign-in, sign-up).
    /// Otherwise the cache is cleared only if the profile belongs to a
    /// different user than before. On profile failure the session ends.
    async fn establish(
        &self,
        tokens: &AuthTokenResponse,
        fresh_identity: bool,
    ) -> Result<(), SessionError> {
        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(tokens.expires_in.saturating_mul(1000));

        if fresh_identity {
            self.reset_cache();
        }

        let credentials = Credentials {
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone(),
            expires_at,
        };
        if let Err(err) = credentials.save(self.store.as_ref()) {
            self.clear_auth();
            return Err(err.into());
        }

        let user = match self.api.profile(&tokens.access_token).await {
            Ok(user) => user,
            Err(err) => {
                warn!(error = %err, "failed to load user profile");
                self.clear_auth();
                return Err(err.into());
            }
        };

        let identity_changed = {
            let mut state = rw_write(&self.state, SOURCE, "establish");
            let previous_id = state.user.as_ref().map(|u| u.user_id.clone());
            let changed = previous_id.as_deref() != Some(user.user_id.as_str());
            *state = SessionState {
                phase: SessionPhase::Authenticated,
                user: Some(user),
                token: Some(tokens.access_token.clone()),
            };
            changed
        };

        if identity_changed && !fresh_identity {
            debug!("identity changed on refresh; clearing cache");
            self.reset_cache();
        }
        Ok(())
    }

    fn clear_auth(&self) {
        if let Err(err) = Credentials::clear(self.store.as_ref()) {
            warn!(error = %err, "failed to remove stored credentials");
        }
        {
            let mut state = rw_write(&self.state, SOURCE, "clear_auth");
            *state = SessionState::anonymous();
        }
        self.reset_cache();
    }

    /// The generation moves before the clear so that a fetch landing after
    /// it sees the change and evicts what it wrote.
    fn reset_cache(&self) {
        self.identity.fetch_add(1, Ordering::SeqCst);
        self.cache.clear();
    }
}

/// Handle of the background expiry check.
#[derive(Debug)]
pub struct RefreshLoop {
    handle: Option<JoinHandle<()>>,
}

impl RefreshLoop {
    pub async fn shutdown(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl Drop for RefreshLoop {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use httpmock::{Mock, MockServer};
    use time::macros::datetime;

    use super::*;
    use turnover_api_types::RotationShoe;

    use crate::cache::{CacheConfig, ManualClock};
    use crate::resources::{RotationFetch, RotationQuery};
    use crate::session::store::{MemoryCredentialStore, StoreError, TOKEN_EXPIRY_KEY, TOKEN_KEY};

    const START_MS: i64 = 1_717_243_200_000; // 2024-06-01 12:00 UTC

    struct Harness {
        server: MockServer,
        clock: Arc<ManualClock>,
        cache: Arc<ResponseCache>,
        store: Arc<MemoryCredentialStore>,
        session: Arc<SessionManager>,
    }

    fn harness() -> Harness {
        harness_with(SessionConfig::default())
    }

    fn harness_with(config: SessionConfig) -> Harness {
        let server = MockServer::start();
        let clock = Arc::new(ManualClock::new(datetime!(2024-06-01 12:00 UTC)));
        let cache = Arc::new(ResponseCache::new(CacheConfig::default(), clock.clone()));
        let store = Arc::new(MemoryCredentialStore::new());
        let api = ApiClient::new(&server.base_url(), Duration::from_secs(5)).expect("client");
        let session = Arc::new(SessionManager::new(
            api,
            cache.clone(),
            store.clone(),
            clock.clone(),
            config,
        ));
        Harness {
            server,
            clock,
            cache,
            store,
            session,
        }
    }

    fn profile_body(user_id: &str) -> String {
        format!(
            r#"{{"success":true,"data":{{"user_id":"{user_id}","first_name":"Ada","last_name":"Runner","email":"ada@example.com","avg_miles_per_week":30,"preferred_categories":["daily"]}}}}"#
        )
    }

    fn tokens_body(access: &str, refresh: &str) -> String {
        format!(
            r#"{{"access_token":"{access}","token_type":"bearer","expires_in":3600,"refresh_token":"{refresh}"}}"#
        )
    }

    fn mock_profile<'a>(server: &'a MockServer, token: &str, user_id: &str) -> Mock<'a> {
        let auth = format!("Bearer {token}");
        let body = profile_body(user_id);
        server.mock(|when, then| {
            when.method("GET").path("/api/users/me").header("authorization", auth);
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        })
    }

    fn mock_refresh<'a>(server: &'a MockServer, old: &str, new_access: &str) -> Mock<'a> {
        let body = tokens_body(new_access, "rt-2");
        server.mock(|when, then| {
            when.method("POST")
                .path("/api/auth/refresh")
                .json_body(serde_json::json!({ "refresh_token": old }));
            then.status(200)
                .header("content-type", "application/json")
                .body(body);
        })
    }

    fn seed_credentials(store: &MemoryCredentialStore, expires_at: i64) {
        Credentials {
            access_token: "at-1".into(),
            refresh_token: "rt-1".into(),
            expires_at,
        }
        .save(store)
        .expect("seed credentials");
    }

    #[tokio::test]
    async fn sign_in_persists_tokens_and_clears_cache() -> Result<(), SessionError> {
        let h = harness();
        h.cache.set("rotation", vec!["someone else's shoe".to_string()]);
        let sign_in = h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signin");
            then.status(200)
                .header("content-type", "application/json")
                .body(tokens_body("at-1", "rt-1"));
        });
        mock_profile(&h.server, "at-1", "u1");

        let session = h.session.sign_in("ada@example.com", "pw").await?;

        sign_in.assert();
        assert!(session.is_authenticated);
        assert_eq!(session.phase, SessionPhase::Authenticated);
        assert_eq!(session.user_id(), Some("u1"));
        assert!(h.cache.is_empty());
        assert_eq!(h.store.get(TOKEN_KEY)?, Some("at-1".into()));
        assert_eq!(
            h.store.get(TOKEN_EXPIRY_KEY)?,
            Some((START_MS + 3_600_000).to_string())
        );
        Ok(())
    }

    #[tokio::test]
    async fn failed_sign_in_returns_to_anonymous_and_keeps_cache() {
        let h = harness();
        h.cache.set("shoes", 1_u32);
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signin");
            then.status(401)
                .header("content-type", "application/json")
                .body(r#"{"detail":"Invalid email or password"}"#);
        });

        let err = h
            .session
            .sign_in("ada@example.com", "wrong")
            .await
            .expect_err("bad password");

        assert_eq!(err.user_message(), "Invalid email or password");
        assert_eq!(h.session.phase(), SessionPhase::Anonymous);
        assert!(h.cache.contains("shoes"));
    }

    #[tokio::test]
    async fn profile_failure_after_sign_in_ends_session() -> Result<(), StoreError> {
        let h = harness();
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signin");
            then.status(200)
                .header("content-type", "application/json")
                .body(tokens_body("at-1", "rt-1"));
        });
        h.server.mock(|when, then| {
            when.method("GET").path("/api/users/me");
            then.status(500);
        });

        let result = h.session.sign_in("ada@example.com", "pw").await;

        assert!(matches!(result, Err(SessionError::Api(_))));
        assert_eq!(h.session.phase(), SessionPhase::Anonymous);
        assert_eq!(h.store.get(TOKEN_KEY)?, None);
        Ok(())
    }

    #[tokio::test]
    async fn sign_up_reports_pending_confirmation() -> Result<(), SessionError> {
        let h = harness();
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signup");
            then.status(200)
                .header("content-type", "application/json")
                .body(r#"{"token_type":"bearer","requires_confirmation":true}"#);
        });

        let outcome = h
            .session
            .sign_up(&SignUpRequest {
                email: "ada@example.com".into(),
                password: "pw".into(),
                first_name: "Ada".into(),
                last_name: "Runner".into(),
            })
            .await?;

        assert_eq!(
            outcome,
            SignUpOutcome::ConfirmationRequired {
                message: DEFAULT_CONFIRMATION_MESSAGE.to_string()
            }
        );
        assert_eq!(h.session.phase(), SessionPhase::Anonymous);
        Ok(())
    }

    #[tokio::test]
    async fn sign_out_clears_every_cached_key() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signout");
            then.status(500);
        });
        h.session.restore().await?;

        let keys = ["rotation", "graveyard?min_rating=4", "user-stats?userId=\"u1\""];
        for key in keys {
            h.cache.set(key, 1_u32);
        }

        h.session.sign_out();

        for key in keys {
            assert_eq!(h.cache.get_stale::<u32>(key), None, "{key} survived sign-out");
        }
        assert_eq!(h.session.phase(), SessionPhase::Anonymous);
        assert!(Credentials::load(h.store.as_ref())?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn fetch_landing_after_sign_out_stays_out_of_cache() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/signout");
            then.status(204);
        });
        let rotation = h.server.mock(|when, then| {
            when.method("GET")
                .path("/api/rotation")
                .header("authorization", "Bearer at-1");
            then.status(200)
                .header("content-type", "application/json")
                .delay(Duration::from_millis(400))
                .body(r#"{"success":true,"data":[]}"#);
        });
        h.session.restore().await?;

        let mut query = RotationQuery::new(Arc::clone(&h.session), RotationFetch::default());
        assert!(query.mount().is_loading);
        tokio::time::sleep(Duration::from_millis(100)).await;

        let _ = h.session.sign_out();
        assert!(h.cache.is_empty());

        let state = query.settle().await;
        rotation.assert();
        assert!(!state.is_loading);
        assert!(state.data.is_empty());
        assert_eq!(h.cache.get_stale::<Vec<RotationShoe>>(query.key()), None);
        assert!(h.cache.is_empty(), "u1 rotation re-entered the cache after sign-out");
        Ok(())
    }

    #[tokio::test]
    async fn missing_refresh_token_ends_a_due_session() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;
        h.cache.set("rotation", 1_u32);

        // Another process signed out and emptied the shared store.
        h.store.remove(REFRESH_TOKEN_KEY)?;
        h.clock.advance(Duration::from_secs(58 * 60));

        assert_eq!(h.session.valid_token().await, None);
        let session = h.session.snapshot();
        assert!(!session.is_authenticated);
        assert_eq!(session.phase, SessionPhase::Anonymous);
        assert!(h.cache.is_empty());
        assert!(Credentials::load(h.store.as_ref())?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn restore_without_credentials_stays_anonymous() -> Result<(), SessionError> {
        let h = harness();
        let session = h.session.restore().await?;
        assert!(!session.is_authenticated);
        assert_eq!(session.phase, SessionPhase::Anonymous);
        Ok(())
    }

    #[tokio::test]
    async fn restore_falls_back_to_refresh_when_profile_rejected() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        h.server.mock(|when, then| {
            when.method("GET")
                .path("/api/users/me")
                .header("authorization", "Bearer at-1");
            then.status(401).body(r#"{"detail":"expired"}"#);
        });
        let refresh = mock_refresh(&h.server, "rt-1", "at-2");
        mock_profile(&h.server, "at-2", "u1");

        let session = h.session.restore().await?;

        refresh.assert();
        assert!(session.is_authenticated);
        assert_eq!(session.token.as_deref(), Some("at-2"));
        Ok(())
    }

    #[tokio::test]
    async fn due_refresh_extends_expiry_once() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        let refresh = mock_refresh(&h.server, "rt-1", "at-2");
        mock_profile(&h.server, "at-2", "u1");
        h.session.restore().await?;

        // Four minutes left.
        h.store.set(TOKEN_EXPIRY_KEY, &(START_MS + 4 * 60 * 1000).to_string())?;
        assert!(h.session.refresh_due()?);

        assert!(h.session.check_and_refresh().await?);
        let new_expiry = load_expiry(h.store.as_ref())?;
        assert!(new_expiry > START_MS + 4 * 60 * 1000);
        assert_eq!(h.session.current_token().as_deref(), Some("at-2"));

        assert!(!h.session.check_and_refresh().await?);
        refresh.assert_hits(1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_loop_renews_due_token_until_dropped() -> Result<(), SessionError> {
        let h = harness_with(SessionConfig {
            check_interval: Duration::from_millis(20),
            ..SessionConfig::default()
        });
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;
        let refresh = mock_refresh(&h.server, "rt-1", "at-2");
        mock_profile(&h.server, "at-2", "u1");

        let due_at = START_MS + 4 * 60 * 1000;
        h.store.set(TOKEN_EXPIRY_KEY, &due_at.to_string())?;

        let refresh_loop = h.session.spawn_refresh_loop();
        tokio::time::timeout(Duration::from_secs(5), async {
            while h.session.current_token().as_deref() != Some("at-2") {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("loop refreshed the token");

        refresh.assert_hits(1);
        assert!(load_expiry(h.store.as_ref())? > due_at);

        drop(refresh_loop);
        let later = h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/refresh");
            then.status(401);
        });
        h.store.set(TOKEN_EXPIRY_KEY, &due_at.to_string())?;
        tokio::time::sleep(Duration::from_millis(200)).await;

        refresh.assert_hits(1);
        later.assert_hits(0);
        assert_eq!(load_expiry(h.store.as_ref())?, due_at);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;
        let refresh = mock_refresh(&h.server, "rt-1", "at-2");
        mock_profile(&h.server, "at-2", "u1");

        h.clock.advance(Duration::from_secs(58 * 60));
        let (a, b, c) = tokio::join!(
            h.session.valid_token(),
            h.session.valid_token(),
            h.session.valid_token()
        );

        assert_eq!(a.as_deref(), Some("at-2"));
        assert_eq!(b, a);
        assert_eq!(c, a);
        refresh.assert_hits(1);
        Ok(())
    }

    #[tokio::test]
    async fn refresh_failure_is_terminal() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;
        h.cache.set("rotation", 1_u32);
        h.server.mock(|when, then| {
            when.method("POST").path("/api/auth/refresh");
            then.status(401).body(r#"{"detail":"revoked"}"#);
        });

        assert_eq!(h.session.refresh().await?, None);

        assert_eq!(h.session.phase(), SessionPhase::Anonymous);
        assert!(h.cache.is_empty());
        assert!(Credentials::load(h.store.as_ref())?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn refresh_keeps_cache_for_same_user() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;
        mock_refresh(&h.server, "rt-1", "at-2");
        mock_profile(&h.server, "at-2", "u1");
        h.cache.set("rotation", 1_u32);

        h.session.refresh().await?;

        assert!(h.cache.contains("rotation"));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_into_other_identity_clears_cache() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;
        mock_refresh(&h.server, "rt-1", "at-2");
        mock_profile(&h.server, "at-2", "u2");
        h.cache.set("rotation", 1_u32);

        h.session.refresh().await?;

        assert!(h.cache.is_empty());
        assert_eq!(h.session.snapshot().user_id(), Some("u2"));
        Ok(())
    }

    #[tokio::test]
    async fn valid_token_is_none_when_signed_out() {
        let h = harness();
        assert_eq!(h.session.valid_token().await, None);
    }

    #[tokio::test]
    async fn update_user_merges_fields() -> Result<(), SessionError> {
        let h = harness();
        seed_credentials(&h.store, START_MS + 3_600_000);
        mock_profile(&h.server, "at-1", "u1");
        h.session.restore().await?;

        h.session.update_user(&UserProfileUpdate {
            avg_miles_per_week: Some(45.0),
            ..UserProfileUpdate::default()
        });

        let user = h.session.snapshot().user.expect("user");
        assert_eq!(user.avg_miles_per_week, 45.0);
        assert_eq!(user.first_name, "Ada");
        Ok(())
    }
}

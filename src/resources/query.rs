//! Cache-backed query over one backend resource.
//!
//! A [`ResourceQuery`] is what a view holds while it displays a resource:
//! it answers from the cache when it can, paints stale data while a refresh
//! runs in the background, and writes successful results back.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheParams, Mutation, ResourceKind, ResponseCache, Subscription};
use crate::cache::{rw_read, rw_write};
use crate::client::{ApiClient, ApiError};
use crate::session::SessionManager;

const SOURCE: &str = "resources::query";

/// Monotonic fetch generation. Results from an older generation are dropped.
pub type Epoch = u64;

/// How to load one resource for one set of filters.
#[async_trait]
pub trait ResourceFetch: Send + Sync + 'static {
    type Output: Clone + Default + Send + Sync + 'static;

    const RESOURCE: ResourceKind;

    fn params(&self) -> CacheParams;

    /// Whether a fetch without a token should be skipped.
    fn requires_auth(&self) -> bool {
        true
    }

    /// `false` when the inputs are incomplete (no shoe selected, no user
    /// loaded yet). Nothing is fetched until they are.
    fn enabled(&self) -> bool {
        true
    }

    async fn fetch(&self, api: &ApiClient, token: Option<&str>) -> Result<Self::Output, ApiError>;

    fn cache_key(&self) -> String {
        Self::RESOURCE.key(&self.params())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResourceState<T> {
    pub data: T,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl<T: Default> Default for ResourceState<T> {
    fn default() -> Self {
        Self {
            data: T::default(),
            is_loading: true,
            error: None,
        }
    }
}

struct Shared<T> {
    state: RwLock<ResourceState<T>>,
    epoch: AtomicU64,
}

impl<T: Clone> Shared<T> {
    fn snapshot(&self) -> ResourceState<T> {
        rw_read(&self.state, SOURCE, "snapshot").clone()
    }

    fn update(&self, op: &'static str, f: impl FnOnce(&mut ResourceState<T>)) {
        f(&mut rw_write(&self.state, SOURCE, op));
    }

    fn current_epoch(&self) -> Epoch {
        self.epoch.load(Ordering::SeqCst)
    }

    fn next_epoch(&self) -> Epoch {
        self.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }
}

pub struct ResourceQuery<F: ResourceFetch> {
    fetch: Arc<F>,
    key: String,
    session: Arc<SessionManager>,
    cache: Arc<ResponseCache>,
    shared: Arc<Shared<F::Output>>,
    in_flight: Option<JoinHandle<()>>,
    has_fetched: bool,
}

impl<F: ResourceFetch> std::fmt::Debug for ResourceQuery<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceQuery")
            .field("key", &self.key)
            .field("has_fetched", &self.has_fetched)
            .field("in_flight", &self.in_flight.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: ResourceFetch> ResourceQuery<F> {
    pub fn new(session: Arc<SessionManager>, fetch: F) -> Self {
        let cache = Arc::clone(session.cache());
        Self {
            key: fetch.cache_key(),
            fetch: Arc::new(fetch),
            session,
            cache,
            shared: Arc::new(Shared {
                state: RwLock::new(ResourceState::default()),
                epoch: AtomicU64::new(0),
            }),
            in_flight: None,
            has_fetched: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fetcher(&self) -> &F {
        &self.fetch
    }

    pub fn snapshot(&self) -> ResourceState<F::Output> {
        self.shared.snapshot()
    }

    pub fn data(&self) -> F::Output {
        self.snapshot().data
    }

    /// Notify `callback` whenever the cache entry behind this query changes.
    pub fn subscribe(&self, callback: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.cache.subscribe(self.key.clone(), callback)
    }

    /// First use (or re-render) of the query.
    ///
    /// Fresh cache data is returned as-is. Otherwise stale data, if any, is
    /// painted and one background fetch starts; later calls in the same
    /// mount episode do not start another.
    pub fn mount(&mut self) -> ResourceState<F::Output> {
        if !self.fetch.enabled() {
            self.shared.update("mount.disabled", |s| s.is_loading = false);
            return self.snapshot();
        }

        if let Some(fresh) = self.cache.get::<F::Output>(&self.key) {
            self.shared.update("mount.fresh", |s| {
                s.data = fresh;
                s.is_loading = false;
            });
            self.has_fetched = true;
            return self.snapshot();
        }

        if self.has_fetched {
            return self.snapshot();
        }

        if self.fetch.requires_auth() && self.session.current_token().is_none() {
            self.shared.update("mount.anonymous", |s| s.is_loading = false);
            return self.snapshot();
        }

        self.has_fetched = true;
        self.start_fetch();
        self.snapshot()
    }

    /// Wait for the in-flight fetch, if any, and return the resulting state.
    pub async fn settle(&mut self) -> ResourceState<F::Output> {
        if let Some(handle) = self.in_flight.take() {
            let _ = handle.await;
        }
        self.snapshot()
    }

    /// Fetch from the network regardless of freshness and overwrite the
    /// cache entry.
    pub async fn refetch(&mut self) -> ResourceState<F::Output> {
        if !self.fetch.enabled()
            || (self.fetch.requires_auth() && self.session.current_token().is_none())
        {
            self.shared.update("refetch.skip", |s| s.is_loading = false);
            return self.snapshot();
        }
        self.has_fetched = true;
        self.start_fetch();
        self.settle().await
    }

    /// Swap the filters. A different cache key cancels the current fetch
    /// and starts a new mount episode.
    pub fn set_fetch(&mut self, fetch: F) -> ResourceState<F::Output> {
        let key = fetch.cache_key();
        self.fetch = Arc::new(fetch);
        if key == self.key {
            return self.snapshot();
        }
        debug!(from = %self.key, to = %key, "query key changed");
        self.cancel();
        self.key = key;
        self.has_fetched = false;
        self.mount()
    }

    /// Stop caring about the result. An in-flight request is aborted and any
    /// result that still arrives is discarded.
    pub fn unmount(&mut self) {
        self.cancel();
        self.has_fetched = false;
    }

    fn cancel(&mut self) {
        self.shared.next_epoch();
        if let Some(handle) = self.in_flight.take() {
            handle.abort();
        }
    }

    fn start_fetch(&mut self) {
        if let Some(previous) = self.in_flight.take() {
            previous.abort();
        }
        let epoch = self.shared.next_epoch();
        let generation = self.session.identity_generation();

        let stale = self.cache.get_stale::<F::Output>(&self.key);
        self.shared.update("fetch.begin", |s| {
            if let Some(stale) = stale {
                s.data = stale;
            }
            s.is_loading = true;
            s.error = None;
        });

        let fetch = Arc::clone(&self.fetch);
        let session = Arc::clone(&self.session);
        let cache = Arc::clone(&self.cache);
        let shared = Arc::clone(&self.shared);
        let key = self.key.clone();

        debug!(key = %key, epoch, "resource fetch started");
        self.in_flight = Some(tokio::spawn(async move {
            let token = session.valid_token().await;
            if fetch.requires_auth() && token.is_none() {
                if shared.current_epoch() == epoch {
                    shared.update("fetch.no_token", |s| s.is_loading = false);
                }
                return;
            }

            let result = fetch.fetch(session.api(), token.as_deref()).await;
            if shared.current_epoch() != epoch {
                debug!(key = %key, epoch, "discarding superseded fetch result");
                return;
            }
            if !session.is_current_identity(generation) {
                debug!(key = %key, "discarding fetch result of a previous identity");
                shared.update("fetch.identity_changed", |s| s.is_loading = false);
                return;
            }

            match result {
                Ok(data) => {
                    shared.update("fetch.ok", |s| {
                        s.data = data.clone();
                        s.is_loading = false;
                        s.error = None;
                    });
                    cache.set(key.clone(), data);
                    // A sign-out between the check above and the write.
                    if !session.is_current_identity(generation) {
                        cache.invalidate(&key);
                    }
                }
                Err(err) => {
                    warn!(key = %key, error = %err, "resource fetch failed");
                    shared.update("fetch.err", |s| {
                        s.error = Some(err.user_message());
                        s.is_loading = false;
                    });
                }
            }
        }));
    }

    /// Run a write against the backend and reconcile the cache.
    ///
    /// On success `apply` folds the result into this query's data, the new
    /// data replaces the own cache entry, and only then are the dependent
    /// resources of `mutation` invalidated. A query that has not loaded yet
    /// evicts its own entry instead. On failure nothing in the cache
    /// changes and the error is returned. Without a token the call is
    /// skipped and resolves to `Ok(None)`. A result that arrives after the
    /// session changed identity is returned but never cached.
    pub(crate) async fn mutate<R, Call, Fut>(
        &mut self,
        mutation: Mutation,
        call: Call,
        apply: impl FnOnce(&mut F::Output, &R),
    ) -> Result<Option<R>, ApiError>
    where
        Call: FnOnce(ApiClient, String) -> Fut,
        Fut: Future<Output = Result<R, ApiError>>,
    {
        debug_assert_eq!(
            mutation.owner(),
            Some(F::RESOURCE),
            "{} runs against a query it does not own",
            mutation.as_str()
        );
        let Some(token) = self.session.valid_token().await else {
            debug!(mutation = mutation.as_str(), "mutation skipped without a token");
            return Ok(None);
        };
        let generation = self.session.identity_generation();

        let result = match call(self.session.api().clone(), token).await {
            Ok(result) => result,
            Err(err) => {
                warn!(mutation = mutation.as_str(), error = %err, "mutation failed");
                self.shared
                    .update("mutate.err", |s| s.error = Some(err.user_message()));
                return Err(err);
            }
        };

        if !self.session.is_current_identity(generation) {
            debug!(
                mutation = mutation.as_str(),
                "identity changed during mutation; cache left alone"
            );
            return Ok(Some(result));
        }

        // Folding into data that never loaded would cache a partial list.
        let mut next = None;
        let loaded = self.has_fetched;
        self.shared.update("mutate.ok", |s| {
            if loaded && !s.is_loading {
                apply(&mut s.data, &result);
                next = Some(s.data.clone());
            }
        });
        match next {
            Some(data) => self.cache.set(self.key.clone(), data),
            None => self.cache.invalidate(&self.key),
        }
        if !self.session.is_current_identity(generation) {
            self.cache.invalidate(&self.key);
        }

        invalidate_dependents(&self.cache, mutation);
        Ok(Some(result))
    }
}

pub(crate) fn invalidate_dependents(cache: &ResponseCache, mutation: Mutation) {
    for resource in mutation.invalidates() {
        let removed = cache.invalidate_resource(*resource);
        debug!(
            mutation = mutation.as_str(),
            resource = %resource,
            removed,
            "dependent resource invalidated"
        );
    }
}

impl<F: ResourceFetch> Drop for ResourceQuery<F> {
    fn drop(&mut self) {
        self.unmount();
    }
}

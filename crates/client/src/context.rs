//! Application context shared across all consumers of the sync core.
//!
//! One context is constructed at startup and passed by reference to
//! everything that needs it - explicit dependency injection, no ambient
//! global lookup.

use std::sync::Arc;

use listly_core::ListId;
use tracing::info;

use crate::auth::AuthStore;
use crate::cache::EntityCache;
use crate::config::Config;
use crate::error::Result;
use crate::gateway::{Gateway, HttpGateway};
use crate::local::LocalStore;
use crate::orchestrator::Orchestrator;
use crate::realtime::RealtimeInvalidator;

/// Application context owning the gateway, cache, orchestrator, realtime
/// invalidator, local store, and auth store.
///
/// Cheaply cloneable via `Arc`; clones share all state.
#[derive(Clone)]
pub struct AppContext {
    inner: Arc<AppContextInner>,
}

struct AppContextInner {
    config: Config,
    gateway: Arc<dyn Gateway>,
    cache: EntityCache,
    orchestrator: Orchestrator,
    realtime: RealtimeInvalidator,
    local: LocalStore,
    auth: AuthStore,
}

impl AppContext {
    /// Build a context over the HTTP gateway described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: Config) -> Result<Self> {
        let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&config)?);
        Ok(Self::with_gateway(config, gateway))
    }

    /// Build a context over an arbitrary gateway (used by tests with an
    /// in-memory backend).
    #[must_use]
    pub fn with_gateway(config: Config, gateway: Arc<dyn Gateway>) -> Self {
        let cache = EntityCache::new();
        let orchestrator = Orchestrator::new(cache.clone());
        let realtime = RealtimeInvalidator::new(Arc::clone(&gateway), cache.clone());
        let local = LocalStore::new(config.data_dir.clone());
        let auth = AuthStore::new(Arc::clone(&gateway), local.clone());

        Self {
            inner: Arc::new(AppContextInner {
                config,
                gateway,
                cache,
                orchestrator,
                realtime,
                local,
                auth,
            }),
        }
    }

    /// Configuration the context was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The remote data gateway.
    #[must_use]
    pub fn gateway(&self) -> &Arc<dyn Gateway> {
        &self.inner.gateway
    }

    /// The entity cache.
    #[must_use]
    pub fn cache(&self) -> &EntityCache {
        &self.inner.cache
    }

    /// The query/mutation orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.inner.orchestrator
    }

    /// The realtime invalidator.
    #[must_use]
    pub fn realtime(&self) -> &RealtimeInvalidator {
        &self.inner.realtime
    }

    /// The device-local key-value store.
    #[must_use]
    pub fn local(&self) -> &LocalStore {
        &self.inner.local
    }

    /// The auth/session store.
    #[must_use]
    pub fn auth(&self) -> &AuthStore {
        &self.inner.auth
    }

    /// Restore a persisted session, if any, and activate the user's
    /// realtime scope.
    pub async fn bootstrap(&self) {
        if let Some(session) = self.inner.auth.restore() {
            self.inner.realtime.set_user(Some(session.user_id)).await;
        }
    }

    /// Make `list_id` the active list for realtime purposes (or none).
    pub async fn set_active_list(&self, list_id: Option<ListId>) {
        self.inner.realtime.set_active_list(list_id).await;
    }

    /// Sign the current user out.
    ///
    /// Teardown order: realtime scopes first (stop accepting events), then
    /// the full cache eviction, then the auth store's local-then-remote
    /// clear. After this returns, no cached entity of the previous user is
    /// readable.
    pub async fn sign_out(&self) {
        self.inner.realtime.clear().await;
        self.inner.cache.evict_all().await;
        self.inner.auth.sign_out().await;
        info!("Session torn down");
    }
}

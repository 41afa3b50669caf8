//! Query/mutation orchestrator: the single path for reads and writes.
//!
//! Reads go cache-first with request coalescing (at most one fetch in
//! flight per key); writes invalidate their dependent keys only after the
//! gateway acknowledges success. No optimistic updates: the cache reflects
//! confirmed server state only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;
use listly_core::ListId;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, CacheValue, EntityCache};
use crate::error::Result;

/// A restartable fetch for one cache key. No side effects beyond the
/// gateway call.
pub type Fetcher = Arc<dyn Fn() -> BoxFuture<'static, Result<CacheValue>> + Send + Sync>;

/// Outcome shared between coalesced callers. Errors travel as their
/// user-facing message; the initiating caller's error is logged at source.
type FetchOutcome = std::result::Result<CacheValue, String>;

/// Per-key registry of in-flight fetches. Held only for map operations,
/// never across an await.
type InFlightMap = HashMap<CacheKey, watch::Receiver<Option<FetchOutcome>>>;

// =============================================================================
// Read-side types
// =============================================================================

/// Options for a read.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// When false, no fetch is issued at all (e.g. no active list selected);
    /// the caller only observes the current snapshot.
    pub enabled: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl QueryOptions {
    /// A gated-off read.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { enabled: false }
    }
}

/// Snapshot returned to readers.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryState {
    /// Last known value, possibly stale while a refetch runs.
    pub value: Option<CacheValue>,
    /// No data yet (initial fetch pending or gated off with an empty cache).
    pub is_loading: bool,
    /// A refetch is in flight while stale data remains visible.
    pub is_fetching: bool,
    /// Message of the most recent fetch failure, if any.
    pub error: Option<String>,
}

impl QueryState {
    fn from_parts(value: Option<CacheValue>, error: Option<String>, is_fetching: bool) -> Self {
        Self {
            is_loading: value.is_none(),
            value,
            is_fetching,
            error,
        }
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Issues fetches on demand, deduplicates concurrent requests per key, and
/// applies mutations with cache invalidation afterward.
#[derive(Clone)]
pub struct Orchestrator {
    cache: EntityCache,
    in_flight: Arc<Mutex<InFlightMap>>,
}

impl Orchestrator {
    /// Create an orchestrator over the given cache.
    #[must_use]
    pub fn new(cache: EntityCache) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The cache this orchestrator reads and writes.
    #[must_use]
    pub const fn cache(&self) -> &EntityCache {
        &self.cache
    }

    /// Non-blocking view of `key`: cache content plus the in-flight flag.
    pub async fn snapshot(&self, key: CacheKey) -> QueryState {
        let entry = self.cache.get(&key).await.unwrap_or_default();
        QueryState::from_parts(entry.value, entry.error, self.is_fetching(&key))
    }

    fn is_fetching(&self, key: &CacheKey) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Read `key`, fetching through `fetch` on miss or staleness.
    ///
    /// Concurrent callers for the same key coalesce onto one underlying
    /// fetch and all observe its result. A fetch failure records the error
    /// on the entry; the previous value (if any) stays readable.
    #[instrument(skip(self, options, fetch), fields(key = %key))]
    pub async fn query<F, Fut>(&self, key: CacheKey, options: QueryOptions, fetch: F) -> QueryState
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>> + Send,
    {
        let cached = self.cache.get(&key).await;

        if !options.enabled {
            let entry = cached.unwrap_or_default();
            return QueryState::from_parts(entry.value, entry.error, self.is_fetching(&key));
        }

        // Fresh hit: serve without a fetch.
        if let Some(entry) = &cached
            && !entry.stale
            && entry.value.is_some()
        {
            return QueryState::from_parts(entry.value.clone(), entry.error.clone(), false);
        }

        let previous = cached.and_then(|entry| entry.value);
        let outcome = self.fetch_coalesced(key, fetch).await;

        match outcome {
            Ok(value) => QueryState::from_parts(Some(value), None, false),
            Err(message) => QueryState::from_parts(previous, Some(message), false),
        }
    }

    /// Join an in-flight fetch for `key`, or start one.
    ///
    /// If the initiating caller is dropped mid-fetch (a mounted reader
    /// unmounting during its initial fetch), its registry slot is removed
    /// by the guard and any coalesced caller takes over with its own
    /// fetch; the key is never left pointing at a dead channel.
    async fn fetch_coalesced<F, Fut>(&self, key: CacheKey, fetch: F) -> FetchOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheValue>> + Send,
    {
        let tx = loop {
            let mut rx = {
                let mut in_flight = self
                    .in_flight
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                if let Some(rx) = in_flight.get(&key) {
                    rx.clone()
                } else {
                    let (tx, rx) = watch::channel(None);
                    in_flight.insert(key, rx);
                    break tx;
                }
            };
            debug!(key = %key, "Coalescing onto in-flight fetch");
            if let Some(outcome) = Self::await_outcome(&mut rx).await {
                return outcome;
            }
            debug!(key = %key, "In-flight fetch abandoned; taking over");
        };

        // This caller owns the fetch; the guard removes the registry slot
        // on every exit path, including this future being dropped.
        let guard = InFlightGuard {
            key,
            registry: Arc::clone(&self.in_flight),
        };

        let outcome = match fetch().await {
            Ok(value) => {
                self.cache.set(key, value.clone()).await;
                Ok(value)
            }
            Err(e) => {
                let message = e.to_string();
                warn!(key = %key, error = %message, "Fetch failed");
                self.cache.record_error(key, message.clone()).await;
                Err(message)
            }
        };

        // Remove before publishing so a caller arriving in between starts a
        // fresh fetch instead of observing a stale in-flight slot.
        drop(guard);
        let _ = tx.send(Some(outcome.clone()));
        outcome
    }

    /// Wait for a coalesced fetch's published outcome. `None` means the
    /// initiator was dropped without publishing.
    async fn await_outcome(
        rx: &mut watch::Receiver<Option<FetchOutcome>>,
    ) -> Option<FetchOutcome> {
        loop {
            if let Some(outcome) = rx.borrow_and_update().clone() {
                return Some(outcome);
            }
            if rx.changed().await.is_err() {
                return None;
            }
        }
    }

    /// Mount a reader on `key`: fetch once, then refetch exactly once per
    /// invalidation of the key. Dropping the handle tears the task down.
    #[must_use]
    pub fn watch(&self, key: CacheKey, fetcher: Fetcher) -> WatchHandle {
        let orchestrator = self.clone();
        let mut invalidations = self.cache.watch_invalidations();
        let (tx, updates) = watch::channel(QueryState::default());

        let task = tokio::spawn(async move {
            let state = orchestrator
                .query(key, QueryOptions::default(), || fetcher())
                .await;
            let _ = tx.send(state);

            loop {
                match invalidations.recv().await {
                    Ok(invalidated) if invalidated == key => {
                        let state = orchestrator
                            .query(key, QueryOptions::default(), || fetcher())
                            .await;
                        if tx.send(state).is_err() {
                            break; // handle dropped
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Missed notifications; refetch once to converge.
                        warn!(key = %key, skipped, "Invalidation stream lagged");
                        let state = orchestrator
                            .query(key, QueryOptions::default(), || fetcher())
                            .await;
                        if tx.send(state).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        WatchHandle { task, updates }
    }

    /// Execute a mutation; on acknowledged success invalidate every listed
    /// key, triggering refetch for any mounted reader.
    ///
    /// On failure nothing is invalidated and no rollback happens (there was
    /// no optimistic update); the error returns to the caller.
    ///
    /// # Errors
    ///
    /// Propagates the mutation's error unchanged.
    pub async fn mutate<T, Fut>(
        &self,
        mutation: Fut,
        invalidates: Vec<Invalidation>,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let output = mutation.await?;
        // Invalidation strictly after the write is acknowledged.
        for target in invalidates {
            match target {
                Invalidation::Key(key) => self.cache.invalidate(key).await,
                Invalidation::ListItems(list) => self.cache.invalidate_list_items(list).await,
                Invalidation::AllPriceHistory => self.cache.invalidate_price_history().await,
            }
        }
        Ok(output)
    }
}

/// Clears a key's in-flight registry slot when the initiating fetch
/// finishes or its future is dropped.
struct InFlightGuard {
    key: CacheKey,
    registry: Arc<Mutex<InFlightMap>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// What a mutation invalidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    /// One concrete key.
    Key(CacheKey),
    /// Every cached item page of a list (`items:{L}:*`).
    ListItems(ListId),
    /// Every cached price-history entry, after a bulk reset.
    AllPriceHistory,
}

/// A mounted reader. The task refetching on invalidation is aborted when
/// the handle drops, on every exit path.
#[derive(Debug)]
pub struct WatchHandle {
    task: JoinHandle<()>,
    updates: watch::Receiver<QueryState>,
}

impl WatchHandle {
    /// Latest state observed by this reader.
    #[must_use]
    pub fn state(&self) -> QueryState {
        self.updates.borrow().clone()
    }

    /// Wait for the next state change.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader task has ended.
    pub async fn changed(&mut self) -> std::result::Result<(), watch::error::RecvError> {
        self.updates.changed().await
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use listly_core::UserId;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn lists_key() -> CacheKey {
        CacheKey::Lists {
            user: UserId::generate(),
        }
    }

    #[tokio::test]
    async fn test_query_fetches_on_miss_then_serves_from_cache() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            let state = orchestrator
                .query(key, QueryOptions::default(), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(CacheValue::Lists(Vec::new()))
                })
                .await;
            assert!(state.value.is_some());
            assert!(!state.is_loading);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1, "fresh hits must not fetch");
    }

    #[tokio::test]
    async fn test_query_disabled_never_fetches() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        let calls = Arc::new(AtomicUsize::new(0));

        let calls_clone = Arc::clone(&calls);
        let state = orchestrator
            .query(key, QueryOptions::disabled(), move || async move {
                calls_clone.fetch_add(1, Ordering::SeqCst);
                Ok(CacheValue::Lists(Vec::new()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(state.value.is_none());
    }

    #[tokio::test]
    async fn test_query_error_keeps_previous_value() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();

        let state = orchestrator
            .query(key, QueryOptions::default(), || async {
                Ok(CacheValue::Lists(Vec::new()))
            })
            .await;
        assert!(state.value.is_some());

        orchestrator.cache().invalidate(key).await;

        let state = orchestrator
            .query(key, QueryOptions::default(), || async {
                Err(SyncError::Api {
                    status: 500,
                    message: "down".into(),
                })
            })
            .await;

        assert!(state.value.is_some(), "stale value stays visible");
        assert!(state.error.as_deref().unwrap().contains("down"));
    }

    #[tokio::test]
    async fn test_concurrent_queries_coalesce() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        let calls = Arc::new(AtomicUsize::new(0));
        let gate = Arc::new(tokio::sync::Notify::new());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let orchestrator = orchestrator.clone();
            let calls = Arc::clone(&calls);
            let gate = Arc::clone(&gate);
            handles.push(tokio::spawn(async move {
                orchestrator
                    .query(key, QueryOptions::default(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.notified().await;
                        Ok(CacheValue::Lists(Vec::new()))
                    })
                    .await
            }));
        }

        // Let all callers reach the in-flight registry, then release the
        // single underlying fetch.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        gate.notify_waiters();

        for handle in handles {
            let state = handle.await.unwrap();
            assert!(state.value.is_some());
            assert!(state.error.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "exactly one underlying fetch");
    }

    #[tokio::test]
    async fn test_cancelled_fetch_releases_the_key() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        let gate = Arc::new(tokio::sync::Notify::new());

        // A reader aborted mid-fetch (a mounted reader unmounting).
        let gated = {
            let orchestrator = orchestrator.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                orchestrator
                    .query(key, QueryOptions::default(), move || async move {
                        gate.notified().await;
                        Ok(CacheValue::Lists(Vec::new()))
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        gated.abort();
        let _ = gated.await;

        assert!(
            !orchestrator.is_fetching(&key),
            "the aborted fetch must release its registry slot"
        );

        let calls = Arc::new(AtomicUsize::new(0));
        let fetch_calls = Arc::clone(&calls);
        let state = orchestrator
            .query(key, QueryOptions::default(), move || async move {
                fetch_calls.fetch_add(1, Ordering::SeqCst);
                Ok(CacheValue::Lists(Vec::new()))
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1, "a fresh fetch is issued");
        assert!(state.value.is_some());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_coalesced_caller_takes_over_abandoned_fetch() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        let gate = Arc::new(tokio::sync::Notify::new());

        let initiator = {
            let orchestrator = orchestrator.clone();
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                orchestrator
                    .query(key, QueryOptions::default(), move || async move {
                        gate.notified().await;
                        Ok(CacheValue::Lists(Vec::new()))
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // A second caller coalesces while the first is still gated.
        let calls = Arc::new(AtomicUsize::new(0));
        let joiner = {
            let orchestrator = orchestrator.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                orchestrator
                    .query(key, QueryOptions::default(), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok(CacheValue::Lists(Vec::new()))
                    })
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        initiator.abort();
        let _ = initiator.await;

        let state = joiner.await.unwrap();
        assert_eq!(
            calls.load(Ordering::SeqCst),
            1,
            "the waiting caller runs its own fetch"
        );
        assert!(state.value.is_some());
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_mutate_invalidates_only_after_success() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        orchestrator
            .cache()
            .set(key, CacheValue::Lists(Vec::new()))
            .await;

        let result: Result<()> = orchestrator
            .mutate(
                async {
                    Err(SyncError::Api {
                        status: 500,
                        message: "write failed".into(),
                    })
                },
                vec![Invalidation::Key(key)],
            )
            .await;
        assert!(result.is_err());
        let entry = orchestrator.cache().get(&key).await.unwrap();
        assert!(!entry.stale, "failed mutation must not invalidate");

        let result: Result<()> = orchestrator
            .mutate(async { Ok(()) }, vec![Invalidation::Key(key)])
            .await;
        assert!(result.is_ok());
        let entry = orchestrator.cache().get(&key).await.unwrap();
        assert!(entry.stale, "successful mutation invalidates");
    }

    #[tokio::test]
    async fn test_watch_refetches_once_per_invalidation() {
        let orchestrator = Orchestrator::new(EntityCache::new());
        let key = lists_key();
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch_calls = Arc::clone(&calls);
        let fetcher: Fetcher = Arc::new(move || {
            let calls = Arc::clone(&fetch_calls);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(CacheValue::Lists(Vec::new()))
            })
        });

        let mut handle = orchestrator.watch(key, fetcher);
        handle.changed().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1, "initial fetch");

        orchestrator.cache().invalidate(key).await;
        handle.changed().await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "one refetch per invalidation");

        // An unrelated key's invalidation must not trigger a refetch.
        orchestrator.cache().invalidate(lists_key()).await;
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}

//! Entity cache: the latest known snapshot of each server-owned collection.
//!
//! Snapshots are keyed by `(entity-type, scope-id)` and held in a
//! `moka` cache. Invalidation marks an entry stale *in place* - the value
//! stays readable while a refetch is in flight (stale-while-revalidate),
//! and fetch errors never clear previously cached data.
//!
//! The cache is the only mutable shared resource in this crate. It is
//! mutated exclusively through [`EntityCache::set`] / [`EntityCache::invalidate`]
//! calls originating from the orchestrator or the realtime invalidator.

use listly_core::{
    Category, Comment, Item, ItemId, ListId, Member, Notification, PriceEntry, ShoppingList,
    UserId,
};
use moka::future::Cache;
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of cached collections.
const CACHE_CAPACITY: u64 = 1_000;

/// Capacity of the invalidation broadcast channel.
const INVALIDATION_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Keys and values
// =============================================================================

/// Cache key: one logical collection, scoped by list, user, or item.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum CacheKey {
    Lists { user: UserId },
    Items { list: ListId, page: usize },
    Members { list: ListId },
    Categories { user: UserId },
    Comments { item: ItemId },
    PriceHistory { item: ItemId },
    HistoricItemNames { user: UserId },
    Notifications { user: UserId },
}

impl CacheKey {
    /// Whether this key is an item page of the given list (the `items:{L}:*`
    /// wildcard used by invalidation).
    #[must_use]
    pub fn is_item_page_of(&self, list_id: ListId) -> bool {
        matches!(self, Self::Items { list, .. } if *list == list_id)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lists { user } => write!(f, "lists:{user}"),
            Self::Items { list, page } => write!(f, "items:{list}:{page}"),
            Self::Members { list } => write!(f, "members:{list}"),
            Self::Categories { user } => write!(f, "categories:{user}"),
            Self::Comments { item } => write!(f, "comments:{item}"),
            Self::PriceHistory { item } => write!(f, "priceHistory:{item}"),
            Self::HistoricItemNames { user } => write!(f, "historicItemNames:{user}"),
            Self::Notifications { user } => write!(f, "notifications:{user}"),
        }
    }
}

/// Cached value: one variant per collection type.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Lists(Vec<ShoppingList>),
    Items(Vec<Item>),
    Members(Vec<Member>),
    Categories(Vec<Category>),
    Comments(Vec<Comment>),
    PriceHistory(Vec<PriceEntry>),
    ItemNames(Vec<String>),
    Notifications(Vec<Notification>),
}

/// One cache slot: the last known value plus independent staleness and
/// error state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CacheEntry {
    /// Last successfully fetched value, if any.
    pub value: Option<CacheValue>,
    /// Marked by invalidation; cleared by the next successful `set`.
    pub stale: bool,
    /// Last fetch error, if any. Set without clearing `value`.
    pub error: Option<String>,
}

// =============================================================================
// EntityCache
// =============================================================================

/// Keyed in-memory store of collection snapshots.
///
/// Cheaply cloneable; clones share the same underlying store and
/// invalidation channel.
#[derive(Clone)]
pub struct EntityCache {
    store: Cache<CacheKey, CacheEntry>,
    invalidations: broadcast::Sender<CacheKey>,
}

impl EntityCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        let store = Cache::builder().max_capacity(CACHE_CAPACITY).build();
        let (invalidations, _) = broadcast::channel(INVALIDATION_CHANNEL_CAPACITY);
        Self {
            store,
            invalidations,
        }
    }

    /// Current snapshot for `key`. Never blocks on a fetch.
    pub async fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.store.get(key).await
    }

    /// Replace the snapshot for `key` with a freshly fetched value.
    pub async fn set(&self, key: CacheKey, value: CacheValue) {
        self.store
            .insert(
                key,
                CacheEntry {
                    value: Some(value),
                    stale: false,
                    error: None,
                },
            )
            .await;
    }

    /// Mark `key` stale, keeping its value readable, and notify watchers.
    ///
    /// Notification happens even when nothing is cached yet: a mounted
    /// reader that errored out on its first fetch still needs the nudge.
    pub async fn invalidate(&self, key: CacheKey) {
        if let Some(mut entry) = self.store.get(&key).await {
            entry.stale = true;
            self.store.insert(key, entry).await;
        }
        debug!(key = %key, "Invalidated cache key");
        let _ = self.invalidations.send(key);
    }

    /// Invalidate every cached item page of `list_id` (`items:{L}:*`).
    pub async fn invalidate_list_items(&self, list_id: ListId) {
        // moka applies inserts asynchronously; flush before iterating.
        self.store.run_pending_tasks().await;
        let pages: Vec<CacheKey> = self
            .store
            .iter()
            .filter(|(key, _)| key.is_item_page_of(list_id))
            .map(|(key, _)| *key)
            .collect();
        if pages.is_empty() {
            // Nothing cached; still nudge watchers of page zero so a mounted
            // reader refetches.
            let _ = self
                .invalidations
                .send(CacheKey::Items {
                    list: list_id,
                    page: 0,
                });
            return;
        }
        for key in pages {
            self.invalidate(key).await;
        }
    }

    /// Invalidate every cached `priceHistory:{item}` entry. Used after a
    /// bulk purchase-history reset, where the affected item set is not
    /// known client-side.
    pub async fn invalidate_price_history(&self) {
        self.store.run_pending_tasks().await;
        let keys: Vec<CacheKey> = self
            .store
            .iter()
            .filter(|(key, _)| matches!(**key, CacheKey::PriceHistory { .. }))
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.invalidate(key).await;
        }
    }

    /// Record a fetch failure for `key` without clearing its value.
    pub async fn record_error(&self, key: CacheKey, message: String) {
        let mut entry = self.store.get(&key).await.unwrap_or_default();
        entry.error = Some(message);
        self.store.insert(key, entry).await;
    }

    /// Drop every cached entity.
    ///
    /// Called on sign-out: no cached entity from the previous user may
    /// remain readable after another user signs in on the same session.
    pub async fn evict_all(&self) {
        self.store.invalidate_all();
        self.store.run_pending_tasks().await;
        debug!("Evicted all cache entries");
    }

    /// Subscribe to invalidation notifications.
    #[must_use]
    pub fn watch_invalidations(&self) -> broadcast::Receiver<CacheKey> {
        self.invalidations.subscribe()
    }
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn lists_value() -> CacheValue {
        CacheValue::Lists(Vec::new())
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let cache = EntityCache::new();
        let key = CacheKey::Lists {
            user: UserId::generate(),
        };

        assert!(cache.get(&key).await.is_none());

        cache.set(key, lists_value()).await;
        let entry = cache.get(&key).await.unwrap();
        assert!(!entry.stale);
        assert!(entry.error.is_none());
        assert_eq!(entry.value, Some(lists_value()));
    }

    #[tokio::test]
    async fn test_invalidate_marks_stale_keeps_value() {
        let cache = EntityCache::new();
        let key = CacheKey::Members {
            list: ListId::generate(),
        };
        cache.set(key, CacheValue::Members(Vec::new())).await;

        cache.invalidate(key).await;

        let entry = cache.get(&key).await.unwrap();
        assert!(entry.stale);
        assert!(entry.value.is_some());
    }

    #[tokio::test]
    async fn test_invalidate_notifies_watchers() {
        let cache = EntityCache::new();
        let mut rx = cache.watch_invalidations();
        let key = CacheKey::Notifications {
            user: UserId::generate(),
        };

        cache.invalidate(key).await;
        assert_eq!(rx.recv().await.unwrap(), key);
    }

    #[tokio::test]
    async fn test_invalidate_list_items_wildcard() {
        let cache = EntityCache::new();
        let list = ListId::generate();
        let other = ListId::generate();

        cache
            .set(CacheKey::Items { list, page: 0 }, CacheValue::Items(vec![]))
            .await;
        cache
            .set(CacheKey::Items { list, page: 1 }, CacheValue::Items(vec![]))
            .await;
        cache
            .set(
                CacheKey::Items {
                    list: other,
                    page: 0,
                },
                CacheValue::Items(vec![]),
            )
            .await;
        // moka applies inserts asynchronously; flush before iterating.
        cache.store.run_pending_tasks().await;

        cache.invalidate_list_items(list).await;

        for page in 0..2 {
            let entry = cache.get(&CacheKey::Items { list, page }).await.unwrap();
            assert!(entry.stale, "page {page} should be stale");
        }
        let untouched = cache
            .get(&CacheKey::Items {
                list: other,
                page: 0,
            })
            .await
            .unwrap();
        assert!(!untouched.stale, "other list's pages must not be touched");
    }

    #[tokio::test]
    async fn test_record_error_keeps_previous_value() {
        let cache = EntityCache::new();
        let key = CacheKey::Categories {
            user: UserId::generate(),
        };
        cache.set(key, CacheValue::Categories(Vec::new())).await;

        cache.record_error(key, "backend down".to_string()).await;

        let entry = cache.get(&key).await.unwrap();
        assert_eq!(entry.error.as_deref(), Some("backend down"));
        assert!(entry.value.is_some(), "error must not clear cached data");
    }

    #[tokio::test]
    async fn test_evict_all_clears_everything() {
        let cache = EntityCache::new();
        let key_a = CacheKey::Lists {
            user: UserId::generate(),
        };
        let key_b = CacheKey::Members {
            list: ListId::generate(),
        };
        cache.set(key_a, lists_value()).await;
        cache.set(key_b, CacheValue::Members(Vec::new())).await;

        cache.evict_all().await;

        assert!(cache.get(&key_a).await.is_none());
        assert!(cache.get(&key_b).await.is_none());
    }

    #[test]
    fn test_key_display_format() {
        let user = UserId::generate();
        let list = ListId::generate();
        assert_eq!(
            CacheKey::Lists { user }.to_string(),
            format!("lists:{user}")
        );
        assert_eq!(
            CacheKey::Items { list, page: 2 }.to_string(),
            format!("items:{list}:2")
        );
    }
}

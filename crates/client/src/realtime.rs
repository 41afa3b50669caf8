//! Realtime invalidator: translates server-pushed change events into cache
//! invalidations.
//!
//! One channel per scope slot (the active list, the signed-in user) is open
//! at any time. Switching the active list tears the previous channel down
//! before the new one is live, and a generation counter discards events
//! that were already in flight for a superseded scope - no cross-list event
//! leakage.
//!
//! The invalidator never applies event payloads to the cache directly; it
//! only triggers the authoritative refetch path. Channel errors are logged
//! and leave the scope in last-known state until the next scope transition.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use listly_core::{ItemId, ListId, Notification, UserId};
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheKey, EntityCache};
use crate::gateway::{ChangeEvent, ChangeKind, Gateway, Scope, Table};

/// Capacity of the transient alert channel.
const ALERT_CHANNEL_CAPACITY: usize = 32;

/// Tables subscribed per list scope.
const LIST_TABLES: &[Table] = &[Table::Items, Table::ListMembers, Table::Comments];

/// Tables subscribed per user scope.
const USER_TABLES: &[Table] = &[
    Table::Lists,
    Table::ListMembers,
    Table::Categories,
    Table::Notifications,
];

/// Lifecycle of one scope's subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    /// No channel open for this scope.
    Unsubscribed,
    /// Channel being established.
    Subscribing,
    /// Channel ready; events flow.
    Subscribed,
}

/// A transient user-facing message raised by a notification insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
}

struct ScopeSlot {
    scope: Scope,
    task: JoinHandle<()>,
    state: watch::Receiver<SubscriptionState>,
}

impl ScopeSlot {
    fn teardown(self) {
        debug!(scope = %self.scope, "Tearing down realtime channel");
        self.task.abort();
    }
}

#[derive(Default)]
struct Slots {
    list: Option<ScopeSlot>,
    user: Option<ScopeSlot>,
}

/// Maintains exactly one active subscription per scope the UI cares about.
pub struct RealtimeInvalidator {
    gateway: Arc<dyn Gateway>,
    cache: EntityCache,
    alerts: broadcast::Sender<Alert>,
    /// Bumped on every list-scope change; list events stamped with an
    /// older generation are discarded. Per slot so a list switch cannot
    /// fence out the user scope's events.
    list_generation: Arc<AtomicU64>,
    /// Same fence for the user scope.
    user_generation: Arc<AtomicU64>,
    slots: Mutex<Slots>,
}

impl RealtimeInvalidator {
    /// Create an invalidator with no active subscriptions.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, cache: EntityCache) -> Self {
        let (alerts, _) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self {
            gateway,
            cache,
            alerts,
            list_generation: Arc::new(AtomicU64::new(0)),
            user_generation: Arc::new(AtomicU64::new(0)),
            slots: Mutex::new(Slots::default()),
        }
    }

    /// Subscribe to transient alerts (notification inserts for the current
    /// user).
    #[must_use]
    pub fn alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts.subscribe()
    }

    /// Switch the active list scope. `None` deactivates it.
    pub async fn set_active_list(&self, list_id: Option<ListId>) {
        let mut slots = self.slots.lock().await;
        if let (Some(slot), Some(new)) = (&slots.list, list_id)
            && slot.scope == Scope::List(new)
        {
            return; // already subscribed to this list
        }

        // Tear down the previous list channel before establishing the new
        // one; late events are additionally fenced by the generation bump.
        if let Some(slot) = slots.list.take() {
            slot.teardown();
        }
        let generation = self.list_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(list_id) = list_id {
            slots.list = self
                .open_scope(
                    Scope::List(list_id),
                    LIST_TABLES,
                    Arc::clone(&self.list_generation),
                    generation,
                )
                .await;
        }
    }

    /// Switch the user scope (on sign-in / sign-out).
    pub async fn set_user(&self, user_id: Option<UserId>) {
        let mut slots = self.slots.lock().await;
        if let (Some(slot), Some(new)) = (&slots.user, user_id)
            && slot.scope == Scope::User(new)
        {
            return;
        }

        if let Some(slot) = slots.user.take() {
            slot.teardown();
        }
        let generation = self.user_generation.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(user_id) = user_id {
            slots.user = self
                .open_scope(
                    Scope::User(user_id),
                    USER_TABLES,
                    Arc::clone(&self.user_generation),
                    generation,
                )
                .await;
        }
    }

    /// Deactivate both scopes (sign-out).
    pub async fn clear(&self) {
        let mut slots = self.slots.lock().await;
        self.list_generation.fetch_add(1, Ordering::SeqCst);
        self.user_generation.fetch_add(1, Ordering::SeqCst);
        if let Some(slot) = slots.list.take() {
            slot.teardown();
        }
        if let Some(slot) = slots.user.take() {
            slot.teardown();
        }
    }

    /// Current lifecycle state of the list scope.
    pub async fn list_state(&self) -> SubscriptionState {
        let slots = self.slots.lock().await;
        slots
            .list
            .as_ref()
            .map_or(SubscriptionState::Unsubscribed, |slot| *slot.state.borrow())
    }

    /// Current lifecycle state of the user scope.
    pub async fn user_state(&self) -> SubscriptionState {
        let slots = self.slots.lock().await;
        slots
            .user
            .as_ref()
            .map_or(SubscriptionState::Unsubscribed, |slot| *slot.state.borrow())
    }

    /// Open a channel for `scope` and spawn its event loop.
    ///
    /// Subscription failures are logged, not retried: the scope stays
    /// unsubscribed until the next transition.
    async fn open_scope(
        &self,
        scope: Scope,
        tables: &[Table],
        fence: Arc<AtomicU64>,
        generation: u64,
    ) -> Option<ScopeSlot> {
        let (state_tx, state_rx) = watch::channel(SubscriptionState::Subscribing);
        info!(scope = %scope, "Subscribing");

        let mut subscription = match self.gateway.subscribe(scope, tables).await {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(scope = %scope, error = %e, "Subscription failed; leaving scope unsubscribed");
                return None;
            }
        };

        let cache = self.cache.clone();
        let alerts = self.alerts.clone();

        let task = tokio::spawn(async move {
            let _ = state_tx.send(SubscriptionState::Subscribed);
            info!(scope = %scope, "Subscribed");

            while let Some(event) = subscription.recv().await {
                // Scope isolation: an event already in flight when this
                // slot's scope switched must not touch the new scope's
                // keys. Teardown aborts the task; the fence only has to
                // cover events already buffered at that point.
                if fence.load(Ordering::SeqCst) != generation {
                    debug!(scope = %scope, "Discarding event for superseded scope");
                    continue;
                }
                apply_event(&cache, &alerts, scope, &event).await;
            }

            // Feed ended (channel dropped or scope switched). Not retried.
            warn!(scope = %scope, "Realtime channel closed");
            let _ = state_tx.send(SubscriptionState::Unsubscribed);
        });

        Some(ScopeSlot {
            scope,
            task,
            state: state_rx,
        })
    }
}

/// Map one change event onto cache invalidations (and alerts).
async fn apply_event(
    cache: &EntityCache,
    alerts: &broadcast::Sender<Alert>,
    scope: Scope,
    event: &ChangeEvent,
) {
    debug!(scope = %scope, table = %event.table, kind = ?event.kind, "Change event");
    match (scope, event.table) {
        (Scope::List(list), Table::Items) => {
            cache.invalidate_list_items(list).await;
            // A purchase toggles price history for the touched item.
            if let Some(item) = row_id::<ItemId>(event, "id") {
                cache.invalidate(CacheKey::PriceHistory { item }).await;
            }
        }
        (Scope::List(list), Table::ListMembers) => {
            cache.invalidate(CacheKey::Members { list }).await;
        }
        (Scope::List(_), Table::Comments) => {
            if let Some(item) = row_id::<ItemId>(event, "item_id") {
                cache.invalidate(CacheKey::Comments { item }).await;
            }
        }
        (Scope::User(user), Table::Lists) => {
            cache.invalidate(CacheKey::Lists { user }).await;
        }
        // Membership granted or revoked changes which lists the user sees.
        (Scope::User(user), Table::ListMembers) => {
            cache.invalidate(CacheKey::Lists { user }).await;
        }
        (Scope::User(user), Table::Categories) => {
            cache.invalidate(CacheKey::Categories { user }).await;
        }
        (Scope::User(user), Table::Notifications) => {
            cache.invalidate(CacheKey::Notifications { user }).await;
            if event.kind == ChangeKind::Insert
                && let Some(message) = notification_message(event)
            {
                let _ = alerts.send(Alert { message });
            }
        }
        (scope, table) => {
            debug!(scope = %scope, table = %table, "Ignoring event outside scope mapping");
        }
    }
}

/// Pull a typed id out of the event row.
fn row_id<T: serde::de::DeserializeOwned>(event: &ChangeEvent, field: &str) -> Option<T> {
    event
        .row
        .get(field)
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
}

/// User-facing message of a notification row; falls back to the raw
/// `message` field when the row doesn't fully decode.
fn notification_message(event: &ChangeEvent) -> Option<String> {
    if let Ok(notification) = serde_json::from_value::<Notification>(event.row.clone()) {
        return Some(notification.message);
    }
    event
        .row
        .get("message")
        .and_then(|v| v.as_str())
        .map(String::from)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cache::CacheValue;
    use serde_json::json;

    #[tokio::test]
    async fn test_item_event_invalidates_pages_and_price_history() {
        let cache = EntityCache::new();
        let (alerts, _) = broadcast::channel(4);
        let list = ListId::generate();
        let item = ItemId::generate();
        cache
            .set(CacheKey::Items { list, page: 0 }, CacheValue::Items(vec![]))
            .await;
        cache
            .set(CacheKey::PriceHistory { item }, CacheValue::PriceHistory(vec![]))
            .await;

        let event = ChangeEvent {
            kind: ChangeKind::Update,
            table: Table::Items,
            row: json!({ "id": item }),
        };
        apply_event(&cache, &alerts, Scope::List(list), &event).await;

        assert!(
            cache
                .get(&CacheKey::Items { list, page: 0 })
                .await
                .unwrap()
                .stale
        );
        assert!(cache.get(&CacheKey::PriceHistory { item }).await.unwrap().stale);
    }

    #[tokio::test]
    async fn test_comment_event_targets_the_items_thread() {
        let cache = EntityCache::new();
        let (alerts, _) = broadcast::channel(4);
        let list = ListId::generate();
        let item = ItemId::generate();
        cache
            .set(CacheKey::Comments { item }, CacheValue::Comments(vec![]))
            .await;

        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            table: Table::Comments,
            row: json!({ "item_id": item, "body": "get the big one" }),
        };
        apply_event(&cache, &alerts, Scope::List(list), &event).await;

        assert!(cache.get(&CacheKey::Comments { item }).await.unwrap().stale);
    }

    #[tokio::test]
    async fn test_notification_insert_raises_alert() {
        let cache = EntityCache::new();
        let (alerts, mut alert_rx) = broadcast::channel(4);
        let user = UserId::generate();

        let event = ChangeEvent {
            kind: ChangeKind::Insert,
            table: Table::Notifications,
            row: json!({ "message": "Milk was purchased" }),
        };
        apply_event(&cache, &alerts, Scope::User(user), &event).await;

        let alert = alert_rx.recv().await.unwrap();
        assert_eq!(alert.message, "Milk was purchased");
    }

    #[tokio::test]
    async fn test_notification_update_raises_no_alert() {
        let cache = EntityCache::new();
        let (alerts, mut alert_rx) = broadcast::channel(4);
        let user = UserId::generate();

        let event = ChangeEvent {
            kind: ChangeKind::Update,
            table: Table::Notifications,
            row: json!({ "message": "read" }),
        };
        apply_event(&cache, &alerts, Scope::User(user), &event).await;

        assert!(alert_rx.try_recv().is_err(), "mark-read must not alert");
    }
}

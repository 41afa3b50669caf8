//! Item reads and mutations.
//!
//! Item pages live under `items:{list}:{page}` and are read through
//! [`PaginatedQuery`]. Purchase state follows one rule everywhere: `price`
//! and `purchased_at` are set together on purchase and cleared together on
//! revert, and every purchase appends a price-history entry.

use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use listly_core::{CategoryId, Item, ItemId, ListId, PriceEntry, PriceEntryId, UserId};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tracing::instrument;

use crate::cache::{CacheKey, CacheValue};
use crate::context::AppContext;
use crate::error::{Result, SyncError};
use crate::gateway::{rows, Filter, Order, PageRange, Table};
use crate::ops::require_user;
use crate::orchestrator::{Invalidation, QueryOptions, QueryState};
use crate::pagination::PaginatedQuery;

// =============================================================================
// Reads
// =============================================================================

/// Paginated item reader for one list, ordered by position.
#[must_use]
pub fn paginated(ctx: &AppContext, list_id: ListId) -> PaginatedQuery {
    let gateway = ctx.gateway().clone();
    let page_size = ctx.config().page_size;

    let fetch_page = Arc::new(move |page: usize| {
        let gateway = gateway.clone();
        async move {
            let raw = gateway
                .select(
                    Table::Items,
                    &[Filter::eq("list_id", list_id.to_string())],
                    Some(Order::asc("position")),
                    Some(PageRange::page(page, page_size)),
                )
                .await?;
            Ok(rows::decode_items(raw))
        }
        .boxed()
    });

    PaginatedQuery::new(ctx.orchestrator().clone(), list_id, page_size, fetch_page)
}

/// Names of every item the user has ever added, for add-form suggestions.
/// De-duplicated and sorted client-side.
#[instrument(skip(ctx))]
pub async fn historic_names(ctx: &AppContext) -> QueryState {
    let Ok(user) = require_user(ctx) else {
        return QueryState::default();
    };
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(
            CacheKey::HistoricItemNames { user },
            QueryOptions::default(),
            || async move {
                let raw = gateway
                    .select(Table::Items, &[], Some(Order::asc("name")), None)
                    .await?;
                let mut names: Vec<String> = rows::decode_items(raw)
                    .into_iter()
                    .map(|item| item.name)
                    .collect();
                names.dedup();
                Ok(CacheValue::ItemNames(names))
            },
        )
        .await
}

/// Price history of one item, newest first.
#[instrument(skip(ctx))]
pub async fn price_history(ctx: &AppContext, item_id: ItemId) -> QueryState {
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(
            CacheKey::PriceHistory { item: item_id },
            QueryOptions::default(),
            || async move {
                let raw = gateway
                    .select(
                        Table::PriceEntries,
                        &[Filter::eq("item_id", item_id.to_string())],
                        Some(Order::desc("recorded_at")),
                        None,
                    )
                    .await?;
                Ok(CacheValue::PriceHistory(rows::decode_rows(
                    Table::PriceEntries,
                    raw,
                )))
            },
        )
        .await
}

// =============================================================================
// Mutations
// =============================================================================

/// A new item before it has been sent to the backend.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub quantity: u32,
    pub category_id: Option<CategoryId>,
    /// Sort position within the list; callers append with `max + 1`.
    pub position: i32,
}

impl NewItem {
    #[must_use]
    pub fn new(name: impl Into<String>, quantity: u32, position: i32) -> Self {
        Self {
            name: name.into(),
            quantity,
            category_id: None,
            position,
        }
    }
}

/// Add an item to a list. The id is generated client-side so the returned
/// row matches what realtime events will later reference.
///
/// # Errors
///
/// `Validation` for an empty name or zero quantity; otherwise whatever the
/// backend returns.
#[instrument(skip(ctx, item), fields(name = %item.name))]
pub async fn add(ctx: &AppContext, list_id: ListId, item: NewItem) -> Result<Item> {
    let user = require_user(ctx)?;
    let name = item.name.trim().to_string();
    if name.is_empty() {
        return Err(SyncError::Validation("item name must not be empty".to_string()));
    }
    if item.quantity == 0 {
        return Err(SyncError::Validation("quantity must be at least 1".to_string()));
    }

    let gateway = ctx.gateway().clone();
    let row = json!({
        "id": ItemId::generate(),
        "list_id": list_id,
        "name": name,
        "quantity": item.quantity,
        "purchased": false,
        "price": null,
        "purchased_at": null,
        "category_id": item.category_id,
        "assigned_to": null,
        "position": item.position,
    });

    ctx.orchestrator()
        .mutate(
            async move {
                let created = gateway.insert(Table::Items, vec![row]).await?;
                rows::decode_one(Table::Items, created)
            },
            vec![
                Invalidation::ListItems(list_id),
                Invalidation::Key(CacheKey::HistoricItemNames { user }),
            ],
        )
        .await
}

/// Partial item update. Absent fields are left untouched; `category_id`
/// and `assigned_to` distinguish "leave alone" (outer `None`) from
/// "clear" (inner `None`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Option<UserId>>,
}

impl ItemPatch {
    /// Whether the patch changes anything at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quantity.is_none()
            && self.category_id.is_none()
            && self.assigned_to.is_none()
    }
}

/// Apply a partial update to an item.
///
/// # Errors
///
/// `Validation` for an empty patch, an empty name, or zero quantity;
/// otherwise whatever the backend returns.
#[instrument(skip(ctx, patch))]
pub async fn update(
    ctx: &AppContext,
    list_id: ListId,
    item_id: ItemId,
    patch: ItemPatch,
) -> Result<()> {
    require_user(ctx)?;
    if patch.is_empty() {
        return Err(SyncError::Validation("nothing to update".to_string()));
    }
    if let Some(name) = &patch.name
        && name.trim().is_empty()
    {
        return Err(SyncError::Validation("item name must not be empty".to_string()));
    }
    if patch.quantity == Some(0) {
        return Err(SyncError::Validation("quantity must be at least 1".to_string()));
    }

    patch_item(ctx, list_id, item_id, serde_json::to_value(&patch)?).await
}

/// Mark an item purchased at `price`.
///
/// Sets `purchased`, `price`, and `purchased_at` in one write, then appends
/// a price-history entry. Invalidation covers both the item pages and the
/// item's history.
///
/// # Errors
///
/// `Validation` for a negative price; otherwise whatever the backend
/// returns. If the history append fails after the item update succeeded,
/// the error surfaces and the next refetch shows the purchased item.
#[instrument(skip(ctx))]
pub async fn purchase(
    ctx: &AppContext,
    list_id: ListId,
    item_id: ItemId,
    price: Decimal,
) -> Result<()> {
    require_user(ctx)?;
    if price.is_sign_negative() {
        return Err(SyncError::Validation("price must not be negative".to_string()));
    }

    let gateway = ctx.gateway().clone();
    let now = Utc::now();
    let entry = PriceEntry {
        id: PriceEntryId::generate(),
        item_id,
        price,
        recorded_at: now,
    };

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .update(
                        Table::Items,
                        &[Filter::eq("id", item_id.to_string())],
                        json!({ "purchased": true, "price": price, "purchased_at": now }),
                    )
                    .await?;
                gateway
                    .insert(Table::PriceEntries, vec![serde_json::to_value(&entry)?])
                    .await?;
                Ok(())
            },
            vec![
                Invalidation::ListItems(list_id),
                Invalidation::Key(CacheKey::PriceHistory { item: item_id }),
            ],
        )
        .await
}

/// Revert a purchase. Clears `price` and `purchased_at` together with the
/// flag; the price-history entry recorded at purchase time is kept.
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn unpurchase(ctx: &AppContext, list_id: ListId, item_id: ItemId) -> Result<()> {
    require_user(ctx)?;
    patch_item(
        ctx,
        list_id,
        item_id,
        json!({ "purchased": false, "price": null, "purchased_at": null }),
    )
    .await
}

/// Delete an item.
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn remove(ctx: &AppContext, list_id: ListId, item_id: ItemId) -> Result<()> {
    require_user(ctx)?;
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .delete(Table::Items, &[Filter::eq("id", item_id.to_string())])
                    .await
            },
            vec![
                Invalidation::ListItems(list_id),
                Invalidation::Key(CacheKey::Comments { item: item_id }),
                Invalidation::Key(CacheKey::PriceHistory { item: item_id }),
            ],
        )
        .await
}

/// Persist a new ordering: each item's position becomes its index in
/// `ordered`.
///
/// Positions are written row by row, not transactionally. Two concurrent
/// reorders interleave and the later write wins per row; both sides
/// converge on the next refetch.
///
/// # Errors
///
/// Whatever the backend returns; a mid-sequence failure leaves earlier
/// rows written.
#[instrument(skip(ctx, ordered), fields(count = ordered.len()))]
pub async fn reorder(ctx: &AppContext, list_id: ListId, ordered: &[ItemId]) -> Result<()> {
    require_user(ctx)?;
    let gateway = ctx.gateway().clone();
    let ordered = ordered.to_vec();

    ctx.orchestrator()
        .mutate(
            async move {
                for (position, item_id) in ordered.iter().enumerate() {
                    gateway
                        .update(
                            Table::Items,
                            &[Filter::eq("id", item_id.to_string())],
                            json!({ "position": i32::try_from(position).unwrap_or(i32::MAX) }),
                        )
                        .await?;
                }
                Ok(())
            },
            vec![Invalidation::ListItems(list_id)],
        )
        .await
}

/// Revert the whole list to unpurchased via the server-side bulk function,
/// which also clears the affected price histories.
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn reset_purchase_history(ctx: &AppContext, list_id: ListId) -> Result<()> {
    require_user(ctx)?;
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .rpc("reset_purchase_history", json!({ "list_id": list_id }))
                    .await?;
                Ok(())
            },
            vec![
                Invalidation::ListItems(list_id),
                Invalidation::AllPriceHistory,
            ],
        )
        .await
}

async fn patch_item(
    ctx: &AppContext,
    list_id: ListId,
    item_id: ItemId,
    patch: serde_json::Value,
) -> Result<()> {
    let gateway = ctx.gateway().clone();
    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .update(Table::Items, &[Filter::eq("id", item_id.to_string())], patch)
                    .await?;
                Ok(())
            },
            vec![Invalidation::ListItems(list_id)],
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_patch_skips_absent_fields() {
        let patch = ItemPatch {
            quantity: Some(3),
            ..ItemPatch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "quantity": 3 }));
    }

    #[test]
    fn test_item_patch_serializes_explicit_clear() {
        let patch = ItemPatch {
            category_id: Some(None),
            ..ItemPatch::default()
        };
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(value, json!({ "category_id": null }));
    }

    #[test]
    fn test_empty_patch_detected() {
        assert!(ItemPatch::default().is_empty());
        assert!(!ItemPatch {
            name: Some("Milk".to_string()),
            ..ItemPatch::default()
        }
        .is_empty());
    }
}

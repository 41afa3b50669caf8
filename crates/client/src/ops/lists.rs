//! Shopping-list reads and mutations.
//!
//! Reads live under `lists:{user}`. Every mutation invalidates that key;
//! list deletion also drops the dead list's item pages.

use listly_core::{ListId, ShoppingList};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::instrument;

use crate::cache::{CacheKey, CacheValue};
use crate::context::AppContext;
use crate::error::{Result, SyncError};
use crate::gateway::{rows, Filter, Order, Table};
use crate::ops::require_user;
use crate::orchestrator::{Invalidation, QueryOptions, QueryState};

/// Lists visible to the signed-in user, favorites first.
#[instrument(skip(ctx))]
pub async fn fetch(ctx: &AppContext) -> QueryState {
    let Ok(user) = require_user(ctx) else {
        return QueryState::default();
    };
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(CacheKey::Lists { user }, QueryOptions::default(), || async move {
            let raw = gateway
                .select(Table::Lists, &[], Some(Order::desc("favorite")), None)
                .await?;
            Ok(CacheValue::Lists(rows::decode_rows(Table::Lists, raw)))
        })
        .await
}

/// Create a list. The server function also enrolls the creator as owner,
/// so the list and its membership row appear atomically.
///
/// # Errors
///
/// `Validation` for an empty name; otherwise whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn create(ctx: &AppContext, name: &str, budget: Option<Decimal>) -> Result<ShoppingList> {
    let user = require_user(ctx)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("list name must not be empty".to_string()));
    }

    let gateway = ctx.gateway().clone();
    ctx.orchestrator()
        .mutate(
            async move {
                let row = gateway
                    .rpc("create_list_with_owner", json!({ "name": name, "budget": budget }))
                    .await?;
                Ok(serde_json::from_value(row)?)
            },
            vec![Invalidation::Key(CacheKey::Lists { user })],
        )
        .await
}

/// Rename a list.
///
/// # Errors
///
/// `Validation` for an empty name; otherwise whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn rename(ctx: &AppContext, list_id: ListId, name: &str) -> Result<()> {
    let user = require_user(ctx)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("list name must not be empty".to_string()));
    }

    patch_list(ctx, user, list_id, json!({ "name": name })).await
}

/// Set or clear a list's budget.
///
/// # Errors
///
/// `Validation` for a negative budget; otherwise whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn set_budget(ctx: &AppContext, list_id: ListId, budget: Option<Decimal>) -> Result<()> {
    let user = require_user(ctx)?;
    if let Some(budget) = budget
        && budget.is_sign_negative()
    {
        return Err(SyncError::Validation("budget must not be negative".to_string()));
    }

    patch_list(ctx, user, list_id, json!({ "budget": budget })).await
}

/// Toggle the favorite flag. Favorites sort first in [`fetch`].
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn set_favorite(ctx: &AppContext, list_id: ListId, favorite: bool) -> Result<()> {
    let user = require_user(ctx)?;
    patch_list(ctx, user, list_id, json!({ "favorite": favorite })).await
}

/// Delete a list. The backend cascades items, members, and comments; the
/// cache drops the list's item pages so no orphaned snapshot survives.
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn delete(ctx: &AppContext, list_id: ListId) -> Result<()> {
    let user = require_user(ctx)?;
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .delete(Table::Lists, &[Filter::eq("id", list_id.to_string())])
                    .await
            },
            vec![
                Invalidation::Key(CacheKey::Lists { user }),
                Invalidation::ListItems(list_id),
                Invalidation::Key(CacheKey::Members { list: list_id }),
            ],
        )
        .await
}

async fn patch_list(
    ctx: &AppContext,
    user: listly_core::UserId,
    list_id: ListId,
    patch: serde_json::Value,
) -> Result<()> {
    let gateway = ctx.gateway().clone();
    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .update(Table::Lists, &[Filter::eq("id", list_id.to_string())], patch)
                    .await?;
                Ok(())
            },
            vec![Invalidation::Key(CacheKey::Lists { user })],
        )
        .await
}

//! Category reads and mutations.
//!
//! Categories live under `categories:{user}`. A first-time account has no
//! rows; the fetch seeds the default set so the UI never shows an empty
//! category picker.

use listly_core::{Category, CategoryId};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{info, instrument};

use crate::cache::{CacheKey, CacheValue};
use crate::context::AppContext;
use crate::error::{Result, SyncError};
use crate::gateway::{rows, Filter, Gateway, Order, Table};
use crate::ops::require_user;
use crate::orchestrator::{Invalidation, QueryOptions, QueryState};

/// The user's categories, seeding the defaults on first use.
#[instrument(skip(ctx))]
pub async fn fetch(ctx: &AppContext) -> QueryState {
    let Ok(user) = require_user(ctx) else {
        return QueryState::default();
    };
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(
            CacheKey::Categories { user },
            QueryOptions::default(),
            || async move {
                let raw = gateway
                    .select(Table::Categories, &[], Some(Order::asc("name")), None)
                    .await?;
                let mut categories: Vec<Category> = rows::decode_rows(Table::Categories, raw);
                if categories.is_empty() {
                    categories = seed_defaults(gateway.as_ref(), user).await?;
                }
                Ok(CacheValue::Categories(categories))
            },
        )
        .await
}

/// Write the default category set for a fresh account. Upsert keyed on the
/// primary key, so two sessions seeding concurrently converge on one set.
async fn seed_defaults(
    gateway: &dyn Gateway,
    user: listly_core::UserId,
) -> Result<Vec<Category>> {
    let defaults = Category::default_set(user);
    info!(count = defaults.len(), "Seeding default categories");
    let rows = defaults
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()?;
    let written = gateway.upsert(Table::Categories, rows).await?;
    Ok(rows::decode_rows(Table::Categories, written))
}

/// Create a category.
///
/// # Errors
///
/// `Validation` for an empty name; otherwise whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn create(
    ctx: &AppContext,
    name: &str,
    color: &str,
    budget: Option<Decimal>,
) -> Result<Category> {
    let user = require_user(ctx)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("category name must not be empty".to_string()));
    }

    let gateway = ctx.gateway().clone();
    let row = json!({
        "id": CategoryId::generate(),
        "owner_id": user,
        "name": name,
        "color": color,
        "budget": budget,
    });

    ctx.orchestrator()
        .mutate(
            async move {
                let created = gateway.insert(Table::Categories, vec![row]).await?;
                rows::decode_one(Table::Categories, created)
            },
            vec![Invalidation::Key(CacheKey::Categories { user })],
        )
        .await
}

/// Rename a category or change its color or budget.
///
/// # Errors
///
/// `Validation` for an empty name; otherwise whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn update(
    ctx: &AppContext,
    category_id: CategoryId,
    name: &str,
    color: &str,
    budget: Option<Decimal>,
) -> Result<()> {
    let user = require_user(ctx)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("category name must not be empty".to_string()));
    }

    let gateway = ctx.gateway().clone();
    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .update(
                        Table::Categories,
                        &[Filter::eq("id", category_id.to_string())],
                        json!({ "name": name, "color": color, "budget": budget }),
                    )
                    .await?;
                Ok(())
            },
            vec![Invalidation::Key(CacheKey::Categories { user })],
        )
        .await
}

/// Delete a category. The backend nulls `category_id` on affected items;
/// cached item pages pick that up on their next refetch or realtime event.
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx))]
pub async fn delete(ctx: &AppContext, category_id: CategoryId) -> Result<()> {
    let user = require_user(ctx)?;
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .delete(Table::Categories, &[Filter::eq("id", category_id.to_string())])
                    .await
            },
            vec![Invalidation::Key(CacheKey::Categories { user })],
        )
        .await
}

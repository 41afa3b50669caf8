//! Item comment reads and mutations, under `comments:{item}`.

use listly_core::{Comment, CommentId, ItemId};
use serde_json::json;
use tracing::instrument;

use crate::cache::{CacheKey, CacheValue};
use crate::context::AppContext;
use crate::error::{Result, SyncError};
use crate::gateway::{rows, Filter, Order, Table};
use crate::ops::require_user;
use crate::orchestrator::{Invalidation, QueryOptions, QueryState};

/// Comments on one item, oldest first.
#[instrument(skip(ctx))]
pub async fn fetch(ctx: &AppContext, item_id: ItemId) -> QueryState {
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(
            CacheKey::Comments { item: item_id },
            QueryOptions::default(),
            || async move {
                let raw = gateway
                    .select(
                        Table::Comments,
                        &[Filter::eq("item_id", item_id.to_string())],
                        Some(Order::asc("created_at")),
                        None,
                    )
                    .await?;
                Ok(CacheValue::Comments(rows::decode_rows(Table::Comments, raw)))
            },
        )
        .await
}

/// Add a comment to an item.
///
/// # Errors
///
/// `Validation` for an empty body; otherwise whatever the backend returns.
#[instrument(skip(ctx, body))]
pub async fn add(ctx: &AppContext, item_id: ItemId, body: &str) -> Result<Comment> {
    let user = require_user(ctx)?;
    let body = body.trim();
    if body.is_empty() {
        return Err(SyncError::Validation("comment must not be empty".to_string()));
    }

    let gateway = ctx.gateway().clone();
    let row = json!({
        "id": CommentId::generate(),
        "item_id": item_id,
        "author_id": user,
        "body": body,
    });

    ctx.orchestrator()
        .mutate(
            async move {
                let created = gateway.insert(Table::Comments, vec![row]).await?;
                rows::decode_one(Table::Comments, created)
            },
            vec![Invalidation::Key(CacheKey::Comments { item: item_id })],
        )
        .await
}

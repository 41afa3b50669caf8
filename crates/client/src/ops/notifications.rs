//! Notification reads and the mark-read mutation, under
//! `notifications:{user}`.

use listly_core::NotificationId;
use serde_json::json;
use tracing::instrument;

use crate::cache::{CacheKey, CacheValue};
use crate::context::AppContext;
use crate::error::Result;
use crate::gateway::{rows, Filter, Order, Table};
use crate::ops::require_user;
use crate::orchestrator::{Invalidation, QueryOptions, QueryState};

/// The user's notifications, newest first.
#[instrument(skip(ctx))]
pub async fn fetch(ctx: &AppContext) -> QueryState {
    let Ok(user) = require_user(ctx) else {
        return QueryState::default();
    };
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(
            CacheKey::Notifications { user },
            QueryOptions::default(),
            || async move {
                let raw = gateway
                    .select(
                        Table::Notifications,
                        &[],
                        Some(Order::desc("created_at")),
                        None,
                    )
                    .await?;
                Ok(CacheValue::Notifications(rows::decode_rows(
                    Table::Notifications,
                    raw,
                )))
            },
        )
        .await
}

/// Mark the given notifications read.
///
/// An empty id set is a successful no-op: no request is sent and nothing
/// is invalidated, so callers can pass "all currently unread" without
/// first checking whether that set is empty.
///
/// # Errors
///
/// Whatever the backend returns.
#[instrument(skip(ctx, ids), fields(count = ids.len()))]
pub async fn mark_read(ctx: &AppContext, ids: &[NotificationId]) -> Result<()> {
    let user = require_user(ctx)?;
    if ids.is_empty() {
        return Ok(());
    }

    let gateway = ctx.gateway().clone();
    let id_values = ids.iter().map(|id| id.to_string().into()).collect();

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .update(
                        Table::Notifications,
                        &[Filter::is_in("id", id_values)],
                        json!({ "read": true }),
                    )
                    .await?;
                Ok(())
            },
            vec![Invalidation::Key(CacheKey::Notifications { user })],
        )
        .await
}

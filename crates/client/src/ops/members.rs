//! List membership reads and mutations.
//!
//! Membership lives under `members:{list}`. Invitations go through a
//! server-side function so the unknown-email case fails atomically with a
//! human-readable message and no partial row.

use listly_core::{ListId, Member};
use serde_json::json;
use tracing::instrument;

use crate::cache::{CacheKey, CacheValue};
use crate::context::AppContext;
use crate::error::{Result, SyncError};
use crate::gateway::{rows, Filter, Order, Table};
use crate::ops::require_user;
use crate::orchestrator::{Invalidation, QueryOptions, QueryState};

/// Members of a list, owner first.
#[instrument(skip(ctx))]
pub async fn fetch(ctx: &AppContext, list_id: ListId) -> QueryState {
    let gateway = ctx.gateway().clone();

    ctx.orchestrator()
        .query(
            CacheKey::Members { list: list_id },
            QueryOptions::default(),
            || async move {
                let raw = gateway
                    .select(
                        Table::ListMembers,
                        &[Filter::eq("list_id", list_id.to_string())],
                        Some(Order::asc("joined_at")),
                        None,
                    )
                    .await?;
                Ok(CacheValue::Members(rows::decode_rows(Table::ListMembers, raw)))
            },
        )
        .await
}

/// Invite a user to a list by email.
///
/// The lookup and the membership insert happen in one server-side function.
/// When no account matches the email, the function's error message (for
/// example "user not found") surfaces verbatim and nothing is invalidated.
///
/// # Errors
///
/// `Validation` for a malformed email; otherwise whatever the backend
/// returns, including the function's own failure message.
#[instrument(skip(ctx))]
pub async fn invite(ctx: &AppContext, list_id: ListId, email: &str) -> Result<()> {
    require_user(ctx)?;
    let email = email.trim();
    if !email.contains('@') {
        return Err(SyncError::Validation(format!("not a valid email: {email}")));
    }

    let gateway = ctx.gateway().clone();
    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .rpc(
                        "invite_user_by_email",
                        json!({ "list_id": list_id, "email": email }),
                    )
                    .await?;
                Ok(())
            },
            vec![Invalidation::Key(CacheKey::Members { list: list_id })],
        )
        .await
}

/// Remove a member from a list.
///
/// # Errors
///
/// `Validation` when the member is the owner (ownership is not
/// transferable here); otherwise whatever the backend returns.
#[instrument(skip(ctx, member), fields(user = %member.user_id))]
pub async fn remove(ctx: &AppContext, member: &Member) -> Result<()> {
    require_user(ctx)?;
    if !member.is_removable() {
        return Err(SyncError::Validation(
            "the list owner cannot be removed".to_string(),
        ));
    }

    let gateway = ctx.gateway().clone();
    let list_id = member.list_id;
    let user_id = member.user_id;

    ctx.orchestrator()
        .mutate(
            async move {
                gateway
                    .delete(
                        Table::ListMembers,
                        &[
                            Filter::eq("list_id", list_id.to_string()),
                            Filter::eq("user_id", user_id.to_string()),
                        ],
                    )
                    .await
            },
            vec![Invalidation::Key(CacheKey::Members { list: list_id })],
        )
        .await
}

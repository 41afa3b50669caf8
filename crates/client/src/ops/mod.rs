//! Typed operations over the orchestrator and gateway.
//!
//! This is the surface the UI consumes: every read goes through
//! [`crate::orchestrator::Orchestrator::query`] under its documented cache
//! key, and every write goes through `mutate` naming the keys it
//! invalidates. Client-side validation happens here, before any backend
//! round-trip.

pub mod categories;
pub mod comments;
pub mod items;
pub mod lists;
pub mod members;
pub mod notifications;
pub mod templates;

use listly_core::UserId;
use rust_decimal::Decimal;

use crate::context::AppContext;
use crate::error::{Result, SyncError};

/// The signed-in user, or an authorization error.
pub(crate) fn require_user(ctx: &AppContext) -> Result<UserId> {
    ctx.auth()
        .user_id()
        .ok_or_else(|| SyncError::Unauthorized("not signed in".to_string()))
}

// =============================================================================
// Quick-buy budget (device-local; no server-side representation)
// =============================================================================

/// Read the quick-buy budget from local persistence.
#[must_use]
pub fn quick_buy_budget(ctx: &AppContext) -> Option<Decimal> {
    ctx.local().quick_buy_budget()
}

/// Persist the quick-buy budget locally.
pub fn set_quick_buy_budget(ctx: &AppContext, budget: Decimal) {
    ctx.local().set_quick_buy_budget(budget);
}

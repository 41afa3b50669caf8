//! Shopping list entity.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{ListId, UserId};

/// A shopping list owned by one user and shared with zero or more members.
///
/// Deleting a list cascades to its items and memberships on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: ListId,
    pub name: String,
    pub owner_id: UserId,
    /// Optional spending ceiling for the whole list.
    pub budget: Option<Decimal>,
    #[serde(default)]
    pub favorite: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShoppingList {
    /// Whether the given user owns this list.
    #[must_use]
    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_id == user_id
    }
}

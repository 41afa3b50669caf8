//! List membership and roles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{ListId, UserId};

/// Role of a user on a shared list.
///
/// Exactly one `Owner` exists per list (the creator). Owners may invite and
/// remove members; members cannot remove others.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Owner,
    Member,
}

/// Association between a list and a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub list_id: ListId,
    pub user_id: UserId,
    pub role: MemberRole,
    /// Display email, denormalized for rendering the member sheet.
    pub email: String,
    pub joined_at: DateTime<Utc>,
}

impl Member {
    /// Whether this membership record is removable through member removal.
    ///
    /// The owner's record never is; the list itself must be deleted instead.
    #[must_use]
    pub fn is_removable(&self) -> bool {
        self.role != MemberRole::Owner
    }
}

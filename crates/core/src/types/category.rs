//! User-scoped item categories.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CategoryId, UserId};

/// A per-user item category with a color tag and an optional budget ceiling.
///
/// Categories are created lazily: a default set is seeded the first time a
/// user's categories are fetched and none exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub owner_id: UserId,
    pub name: String,
    /// Hex color tag, e.g. `#4caf50`.
    pub color: String,
    pub budget: Option<Decimal>,
}

impl Category {
    /// The default palette seeded on first access.
    #[must_use]
    pub fn default_set(owner_id: UserId) -> Vec<Self> {
        const DEFAULTS: &[(&str, &str)] = &[
            ("Produce", "#4caf50"),
            ("Dairy", "#2196f3"),
            ("Bakery", "#ff9800"),
            ("Meat & Fish", "#f44336"),
            ("Pantry", "#795548"),
            ("Household", "#9e9e9e"),
        ];

        DEFAULTS
            .iter()
            .map(|(name, color)| Self {
                id: CategoryId::generate(),
                owner_id,
                name: (*name).to_string(),
                color: (*color).to_string(),
                budget: None,
            })
            .collect()
    }
}

//! Shopping list items, their comments, and price history.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::id::{CategoryId, CommentId, ItemId, ListId, PriceEntryId, UserId};

/// A single entry on a shopping list.
///
/// Invariant: `price` and `purchased_at` are set together, never
/// independently. [`Item::normalize`] coerces rows that violate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub list_id: ListId,
    pub name: String,
    /// Positive quantity; the backend stores a plain integer.
    pub quantity: u32,
    #[serde(default)]
    pub purchased: bool,
    /// Present iff `purchased` with a recorded price.
    pub price: Option<Decimal>,
    /// Present iff `price` is present.
    pub purchased_at: Option<DateTime<Utc>>,
    pub category_id: Option<CategoryId>,
    pub assigned_to: Option<UserId>,
    /// Display order for manual sorting within the list.
    pub position: i32,
}

impl Item {
    /// Coerce the price/purchase-date invariant.
    ///
    /// If exactly one of `price` / `purchased_at` is present the row is
    /// inconsistent; both are dropped rather than guessing the missing half.
    /// An unpurchased item carries neither. Returns `true` if anything was
    /// coerced, so callers can log the occurrence.
    pub fn normalize(&mut self) -> bool {
        let mut coerced = false;
        if !self.purchased && (self.price.is_some() || self.purchased_at.is_some()) {
            self.price = None;
            self.purchased_at = None;
            coerced = true;
        } else if self.price.is_some() != self.purchased_at.is_some() {
            self.price = None;
            self.purchased_at = None;
            coerced = true;
        }
        coerced
    }
}

/// Free-text note attached to an item. Immutable once created: the consumed
/// interface only appends and lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub item_id: ItemId,
    pub author_id: UserId,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// A historical price observation, appended whenever an item transitions
/// into "purchased" with a price. Never mutated individually; only
/// bulk-cleared when purchase history is reverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub id: PriceEntryId,
    pub item_id: ItemId,
    pub price: Decimal,
    pub recorded_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::prelude::FromPrimitive;

    fn sample() -> Item {
        Item {
            id: ItemId::generate(),
            list_id: ListId::generate(),
            name: "Milk".to_string(),
            quantity: 1,
            purchased: false,
            price: None,
            purchased_at: None,
            category_id: None,
            assigned_to: None,
            position: 0,
        }
    }

    #[test]
    fn test_normalize_consistent_purchased_row() {
        let mut item = sample();
        item.purchased = true;
        item.price = Decimal::from_f64(4.5);
        item.purchased_at = Some(Utc::now());
        assert!(!item.normalize());
        assert!(item.price.is_some());
        assert!(item.purchased_at.is_some());
    }

    #[test]
    fn test_normalize_price_without_date() {
        let mut item = sample();
        item.purchased = true;
        item.price = Decimal::from_f64(4.5);
        assert!(item.normalize());
        assert!(item.price.is_none());
        assert!(item.purchased_at.is_none());
    }

    #[test]
    fn test_normalize_date_without_price() {
        let mut item = sample();
        item.purchased = true;
        item.purchased_at = Some(Utc::now());
        assert!(item.normalize());
        assert!(item.purchased_at.is_none());
    }

    #[test]
    fn test_normalize_unpurchased_with_leftovers() {
        let mut item = sample();
        item.price = Decimal::from_f64(2.0);
        item.purchased_at = Some(Utc::now());
        assert!(item.normalize());
        assert!(item.price.is_none());
        assert!(item.purchased_at.is_none());
    }

    #[test]
    fn test_normalize_clean_unpurchased_row() {
        let mut item = sample();
        assert!(!item.normalize());
    }
}

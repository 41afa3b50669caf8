//! Row validation and normalization at the gateway boundary.
//!
//! The backend returns loosely-typed JSON records. Everything is mapped to
//! the explicit entity types here, before it can enter the entity cache:
//! malformed rows are logged and skipped, and the item price/purchase-date
//! invariant is coerced.

use listly_core::Item;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, SyncError};

use super::Table;

/// Decode rows into `T`, dropping rows that fail validation.
///
/// A malformed row is a backend-side defect; rejecting it keeps the cache
/// free of partially-typed data while the rest of the collection stays
/// usable.
pub fn decode_rows<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> Vec<T> {
    let total = rows.len();
    let decoded: Vec<T> = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<T>(row) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(table = %table, error = %e, "Rejecting malformed row");
                None
            }
        })
        .collect();
    if decoded.len() < total {
        warn!(
            table = %table,
            rejected = total - decoded.len(),
            "Dropped malformed rows from response"
        );
    }
    decoded
}

/// Decode item rows, additionally coercing the price/purchase-date invariant.
pub fn decode_items(rows: Vec<Value>) -> Vec<Item> {
    let mut items: Vec<Item> = decode_rows(Table::Items, rows);
    for item in &mut items {
        if item.normalize() {
            warn!(item = %item.id, "Coerced inconsistent price/purchase state");
        }
    }
    items
}

/// Decode exactly one row, failing if the response was empty.
///
/// # Errors
///
/// Returns `NotFound` when no row came back, or `Parse` when the row does
/// not match `T`.
pub fn decode_one<T: DeserializeOwned>(table: Table, rows: Vec<Value>) -> Result<T> {
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| SyncError::NotFound(format!("no {table} row returned")))?;
    Ok(serde_json::from_value(row)?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use listly_core::{Category, ItemId, ListId};

    fn item_row(purchased: bool, price: Option<&str>, date: bool) -> Value {
        serde_json::json!({
            "id": ItemId::generate(),
            "list_id": ListId::generate(),
            "name": "Milk",
            "quantity": 1,
            "purchased": purchased,
            "price": price,
            "purchased_at": if date { Some(chrono::Utc::now()) } else { None },
            "category_id": null,
            "assigned_to": null,
            "position": 0,
        })
    }

    #[test]
    fn test_decode_rows_skips_malformed() {
        let rows = vec![
            item_row(false, None, false),
            serde_json::json!({ "id": "not-a-uuid" }),
            item_row(false, None, false),
        ];
        let items: Vec<Item> = decode_rows(Table::Items, rows);
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_decode_items_coerces_invariant() {
        // Price present without a purchase date: both must be dropped.
        let items = decode_items(vec![item_row(true, Some("4.5"), false)]);
        assert_eq!(items.len(), 1);
        assert!(items[0].price.is_none());
        assert!(items[0].purchased_at.is_none());
    }

    #[test]
    fn test_decode_items_keeps_consistent_purchase() {
        let items = decode_items(vec![item_row(true, Some("4.5"), true)]);
        assert_eq!(items.len(), 1);
        assert!(items[0].price.is_some());
        assert!(items[0].purchased_at.is_some());
    }

    #[test]
    fn test_decode_one_empty_is_not_found() {
        let result: Result<Category> = decode_one(Table::Categories, vec![]);
        assert!(matches!(result, Err(SyncError::NotFound(_))));
    }
}

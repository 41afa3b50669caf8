//! Device-local list templates.

use serde::{Deserialize, Serialize};

use super::id::CategoryId;
use super::item::Item;

/// One line of a template: name/quantity/category only, no purchase or
/// price data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateEntry {
    pub name: String,
    pub quantity: u32,
    pub category_id: Option<CategoryId>,
}

/// A named, user-local snapshot of a list's entries, used to re-seed a list.
///
/// Templates live only in local persistence and are never synced remotely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListTemplate {
    pub name: String,
    pub entries: Vec<TemplateEntry>,
}

impl ListTemplate {
    /// Snapshot items into a template, stripping purchase and price state.
    #[must_use]
    pub fn from_items(name: impl Into<String>, items: &[Item]) -> Self {
        Self {
            name: name.into(),
            entries: items
                .iter()
                .map(|item| TemplateEntry {
                    name: item.name.clone(),
                    quantity: item.quantity,
                    category_id: item.category_id,
                })
                .collect(),
        }
    }
}

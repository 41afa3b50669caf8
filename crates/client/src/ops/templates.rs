//! List templates: snapshots of a list's items, stored device-locally and
//! replayable into any list.
//!
//! Templates never touch the backend until applied; applying inserts plain
//! unpurchased items through the normal item path.

use listly_core::{Item, ItemId, ListId, ListTemplate};
use serde_json::json;
use tracing::{info, instrument};

use crate::context::AppContext;
use crate::error::{Result, SyncError};
use crate::gateway::Table;
use crate::ops::require_user;
use crate::orchestrator::Invalidation;

/// All saved templates.
#[must_use]
pub fn list(ctx: &AppContext) -> Vec<ListTemplate> {
    ctx.local().templates()
}

/// Save the given items as a named template, stripping purchase state.
/// Saving under an existing name replaces that template.
///
/// # Errors
///
/// `Validation` for an empty name or an empty item set.
pub fn save(ctx: &AppContext, name: &str, items: &[Item]) -> Result<ListTemplate> {
    let name = name.trim();
    if name.is_empty() {
        return Err(SyncError::Validation("template name must not be empty".to_string()));
    }
    if items.is_empty() {
        return Err(SyncError::Validation(
            "a template needs at least one item".to_string(),
        ));
    }

    let template = ListTemplate::from_items(name, items);
    let mut templates = ctx.local().templates();
    templates.retain(|existing| existing.name != template.name);
    templates.push(template.clone());
    ctx.local().set_templates(&templates);
    info!(name, entries = template.entries.len(), "Saved template");
    Ok(template)
}

/// Delete a template by name. Returns whether one existed.
pub fn delete(ctx: &AppContext, name: &str) -> bool {
    let mut templates = ctx.local().templates();
    let before = templates.len();
    templates.retain(|existing| existing.name != name);
    let removed = templates.len() != before;
    if removed {
        ctx.local().set_templates(&templates);
    }
    removed
}

/// Replay a template into a list: one unpurchased item per entry, appended
/// after `position_base`. Returns the number of items created.
///
/// # Errors
///
/// `NotFound` when no template has that name; otherwise whatever the
/// backend returns.
#[instrument(skip(ctx))]
pub async fn apply(
    ctx: &AppContext,
    list_id: ListId,
    name: &str,
    position_base: i32,
) -> Result<usize> {
    require_user(ctx)?;
    let template = ctx
        .local()
        .templates()
        .into_iter()
        .find(|template| template.name == name)
        .ok_or_else(|| SyncError::NotFound(format!("no template named {name}")))?;

    let rows: Vec<serde_json::Value> = template
        .entries
        .iter()
        .enumerate()
        .map(|(offset, entry)| {
            json!({
                "id": ItemId::generate(),
                "list_id": list_id,
                "name": entry.name,
                "quantity": entry.quantity,
                "purchased": false,
                "price": null,
                "purchased_at": null,
                "category_id": entry.category_id,
                "assigned_to": null,
                "position": position_base
                    .saturating_add(i32::try_from(offset).unwrap_or(i32::MAX)),
            })
        })
        .collect();
    let count = rows.len();

    let gateway = ctx.gateway().clone();
    ctx.orchestrator()
        .mutate(
            async move {
                gateway.insert(Table::Items, rows).await?;
                Ok(())
            },
            vec![Invalidation::ListItems(list_id)],
        )
        .await?;
    info!(name, count, "Applied template");
    Ok(count)
}

//! Template commands. Templates are device-local; only `apply` touches
//! the backend.

use listly_client::{ops, AppContext};
use listly_core::ListId;

use super::fetch_all_items;

/// Show every saved template.
pub fn show(ctx: &AppContext) {
    let templates = ops::templates::list(ctx);
    if templates.is_empty() {
        println!("No templates");
        return;
    }
    for template in templates {
        println!("{} ({} entries)", template.name, template.entries.len());
    }
}

/// Snapshot a list's current items under `name`.
pub async fn save(
    ctx: &AppContext,
    list: ListId,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let items = fetch_all_items(ctx, list).await?;
    let template = ops::templates::save(ctx, name, &items)?;
    println!("Saved {} ({} entries)", template.name, template.entries.len());
    Ok(())
}

/// Replay a template into a list.
pub async fn apply(
    ctx: &AppContext,
    list: ListId,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let existing = fetch_all_items(ctx, list).await?;
    let position_base = existing.iter().map(|i| i.position + 1).max().unwrap_or(0);
    let count = ops::templates::apply(ctx, list, name, position_base).await?;
    println!("Added {count} items from {name}");
    Ok(())
}

/// Delete a template by name.
pub fn delete(ctx: &AppContext, name: &str) {
    if ops::templates::delete(ctx, name) {
        println!("Deleted {name}");
    } else {
        println!("No template named {name}");
    }
}


//! Item commands.

use listly_client::{ops, AppContext};
use listly_core::ListId;
use rust_decimal::Decimal;

use super::fetch_all_items;

/// Show a list's items, fetching every page.
pub async fn show(ctx: &AppContext, list: ListId) -> Result<(), Box<dyn std::error::Error>> {
    let items = fetch_all_items(ctx, list).await?;
    if items.is_empty() {
        println!("No items");
        return Ok(());
    }

    for item in items {
        let mark = if item.purchased { "x" } else { " " };
        let price = item
            .price
            .map_or_else(String::new, |p| format!("  @ {p}"));
        println!("[{mark}] {} x{}{price}", item.name, item.quantity);
    }
    Ok(())
}

/// Add an item at the end of the list.
pub async fn add(
    ctx: &AppContext,
    list: ListId,
    name: &str,
    quantity: u32,
) -> Result<(), Box<dyn std::error::Error>> {
    let existing = fetch_all_items(ctx, list).await?;
    let position = existing.iter().map(|i| i.position + 1).max().unwrap_or(0);
    let item = ops::items::add(ctx, list, ops::items::NewItem::new(name, quantity, position)).await?;
    println!("Added {} ({})", item.name, item.id);
    Ok(())
}

/// Mark the first unpurchased item with the given name purchased.
pub async fn buy(
    ctx: &AppContext,
    list: ListId,
    name: &str,
    price: Decimal,
) -> Result<(), Box<dyn std::error::Error>> {
    let items = fetch_all_items(ctx, list).await?;
    let item = items
        .iter()
        .find(|item| !item.purchased && item.name.eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("no unpurchased item named {name}"))?;

    ops::items::purchase(ctx, list, item.id, price).await?;
    println!("Bought {} @ {price}", item.name);
    Ok(())
}


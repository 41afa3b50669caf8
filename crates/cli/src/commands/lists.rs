//! List commands.

use listly_client::cache::CacheValue;
use listly_client::{ops, AppContext};
use rust_decimal::Decimal;

use super::check_read;

/// Show every list visible to the signed-in user.
pub async fn show(ctx: &AppContext) -> Result<(), Box<dyn std::error::Error>> {
    let state = ops::lists::fetch(ctx).await;
    check_read(&state)?;

    let Some(CacheValue::Lists(lists)) = state.value else {
        println!("No lists");
        return Ok(());
    };
    if lists.is_empty() {
        println!("No lists");
        return Ok(());
    }

    for list in lists {
        let marker = if list.favorite { "*" } else { " " };
        let budget = list
            .budget
            .map_or_else(String::new, |b| format!("  (budget {b})"));
        println!("{marker} {}  {}{budget}", list.id, list.name);
    }
    Ok(())
}

/// Create a list.
pub async fn create(
    ctx: &AppContext,
    name: &str,
    budget: Option<Decimal>,
) -> Result<(), Box<dyn std::error::Error>> {
    let list = ops::lists::create(ctx, name, budget).await?;
    println!("Created {} ({})", list.name, list.id);
    Ok(())
}

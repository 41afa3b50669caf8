//! Live view of a list: subscribes the realtime scope and prints cache
//! refreshes and alerts until Ctrl-C.

use std::sync::Arc;

use futures::FutureExt;
use listly_client::cache::{CacheKey, CacheValue};
use listly_client::gateway::{rows, Filter, Order, PageRange, Table};
use listly_client::orchestrator::Fetcher;
use listly_client::AppContext;
use listly_core::ListId;

/// Tail changes to `list` until interrupted.
pub async fn run(ctx: &AppContext, list: ListId) -> Result<(), Box<dyn std::error::Error>> {
    ctx.set_active_list(Some(list)).await;

    let gateway = ctx.gateway().clone();
    let page_size = ctx.config().page_size;
    let fetcher: Fetcher = Arc::new(move || {
        let gateway = gateway.clone();
        async move {
            let raw = gateway
                .select(
                    Table::Items,
                    &[Filter::eq("list_id", list.to_string())],
                    Some(Order::asc("position")),
                    Some(PageRange::page(0, page_size)),
                )
                .await?;
            Ok(CacheValue::Items(rows::decode_items(raw)))
        }
        .boxed()
    });

    let mut handle = ctx
        .orchestrator()
        .watch(CacheKey::Items { list, page: 0 }, fetcher);
    let mut alerts = ctx.realtime().alerts();

    println!("Watching {list} (Ctrl-C to stop)");
    loop {
        tokio::select! {
            changed = handle.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = handle.state();
                if let Some(CacheValue::Items(items)) = state.value {
                    let open = items.iter().filter(|i| !i.purchased).count();
                    println!("-- {} items, {open} open", items.len());
                    for item in items {
                        let mark = if item.purchased { "x" } else { " " };
                        println!("[{mark}] {} x{}", item.name, item.quantity);
                    }
                } else if let Some(error) = state.error {
                    println!("!! {error}");
                }
            }
            alert = alerts.recv() => {
                if let Ok(alert) = alert {
                    println!(">> {}", alert.message);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    ctx.set_active_list(None).await;
    Ok(())
}

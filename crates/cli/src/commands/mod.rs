//! Command implementations.

pub mod auth;
pub mod items;
pub mod lists;
pub mod members;
pub mod template;
pub mod watch;

use listly_client::orchestrator::QueryState;
use listly_client::{ops, AppContext};
use listly_core::{Item, ListId};

/// Fail a command when a read came back with neither data nor a usable
/// snapshot.
pub(crate) fn check_read(state: &QueryState) -> Result<(), Box<dyn std::error::Error>> {
    if state.value.is_none()
        && let Some(error) = &state.error
    {
        return Err(error.clone().into());
    }
    Ok(())
}

/// Walk a list's paginated reader to the end.
pub(crate) async fn fetch_all_items(
    ctx: &AppContext,
    list: ListId,
) -> Result<Vec<Item>, Box<dyn std::error::Error>> {
    let mut query = ops::items::paginated(ctx, list);
    while query.has_next_page() {
        query.fetch_next_page().await;
        if let Some(error) = query.last_error() {
            return Err(error.to_string().into());
        }
    }
    Ok(query.items())
}

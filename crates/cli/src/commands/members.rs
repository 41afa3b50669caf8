//! Membership commands.

use listly_client::{ops, AppContext};
use listly_core::ListId;

/// Invite a user to a list by email. The backend resolves the account;
/// an unknown email fails with its message and changes nothing.
pub async fn invite(
    ctx: &AppContext,
    list: ListId,
    email: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    ops::members::invite(ctx, list, email).await?;
    println!("Invited {email}");
    Ok(())
}

//! Session commands.

use listly_client::AppContext;

/// Sign in and persist the session for subsequent invocations.
pub async fn login(
    ctx: &AppContext,
    email: &str,
    password: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = ctx.auth().sign_in(email, password).await?;
    ctx.realtime().set_user(Some(session.user_id)).await;
    println!("Signed in as {} ({})", session.email, session.user_id);
    Ok(())
}

/// Sign out, evicting every cached entity and the persisted session.
pub async fn logout(ctx: &AppContext) {
    ctx.sign_out().await;
    println!("Signed out");
}

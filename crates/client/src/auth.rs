//! Session store over the gateway's auth endpoints.
//!
//! Sessions are persisted through the local store so a restart can
//! bootstrap without a fresh sign-in. Clearing local state on sign-out
//! happens before the remote call resolves: the device must never keep a
//! usable session just because the network was down.

use std::sync::{Arc, RwLock};

use listly_core::UserId;
use tracing::{info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::gateway::{Gateway, Session};
use crate::local::LocalStore;

const MIN_PASSWORD_LENGTH: usize = 8;

/// Holds the current session and keeps the gateway's bearer token in sync.
pub struct AuthStore {
    gateway: Arc<dyn Gateway>,
    local: LocalStore,
    session: RwLock<Option<Session>>,
}

impl AuthStore {
    /// Create a signed-out store.
    #[must_use]
    pub fn new(gateway: Arc<dyn Gateway>, local: LocalStore) -> Self {
        Self {
            gateway,
            local,
            session: RwLock::new(None),
        }
    }

    /// Restore a persisted session from a previous run, if one exists and
    /// has not expired. Returns the restored session.
    pub fn restore(&self) -> Option<Session> {
        let session = self.local.session()?;
        if session.is_expired() {
            info!("Persisted session expired; discarding");
            self.local.set_session(None);
            return None;
        }
        self.install(session.clone());
        info!(user = %session.user_id, "Restored session");
        Some(session)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns a validation error before any backend call when either field
    /// is empty, or the gateway's error on rejection.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        validate_credentials(email, password)?;
        let session = self.gateway.sign_in(email, password).await?;
        self.install(session.clone());
        info!(user = %session.user_id, "Signed in");
        Ok(session)
    }

    /// Create an account and sign in.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an invalid email or a password shorter
    /// than eight characters, or the gateway's error on rejection.
    #[instrument(skip(self, password), fields(email = %email))]
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        validate_credentials(email, password)?;
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(SyncError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LENGTH} characters"
            )));
        }
        let session = self.gateway.sign_up(email, password).await?;
        self.install(session.clone());
        info!(user = %session.user_id, "Signed up");
        Ok(session)
    }

    /// Sign out: clear local session state, then invalidate it server-side.
    ///
    /// Local state is cleared unconditionally; a failing remote call is
    /// logged but does not resurrect the session.
    pub async fn sign_out(&self) {
        if let Ok(mut guard) = self.session.write() {
            *guard = None;
        }
        self.local.set_session(None);
        self.gateway.set_auth_token(None);

        if let Err(e) = self.gateway.sign_out().await {
            warn!(error = %e, "Remote sign-out failed; local session already cleared");
        }
        info!("Signed out");
    }

    /// Current session, if signed in.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.session.read().ok().and_then(|guard| guard.clone())
    }

    /// Current user id, if signed in.
    #[must_use]
    pub fn user_id(&self) -> Option<UserId> {
        self.session().map(|session| session.user_id)
    }

    fn install(&self, session: Session) {
        self.gateway
            .set_auth_token(Some(session.access_token.clone()));
        self.local.set_session(Some(&session));
        if let Ok(mut guard) = self.session.write() {
            *guard = Some(session);
        }
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(SyncError::Validation(
            "a valid email address is required".to_string(),
        ));
    }
    if password.is_empty() {
        return Err(SyncError::Validation("a password is required".to_string()));
    }
    Ok(())
}

//! Error types for the synchronization core.
//!
//! Recoverable errors terminate at the orchestrator/ops boundary: a failed
//! fetch records an error state on the cache entry without clearing the
//! previously cached value, and a failed mutation returns to the caller for
//! user-facing reporting. Nothing in this crate panics on backend failure.

use thiserror::Error;

/// Errors that can occur while talking to the hosted backend or operating
/// the cache.
#[derive(Debug, Error)]
pub enum SyncError {
    /// HTTP transport failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend returned a non-success status with a message body.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Authorization failure (signed out, or no longer a member of the
    /// targeted list). Surfaced as a user-facing message; never triggers an
    /// automatic sign-out.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited; contains the server-suggested retry delay in seconds.
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// JSON (de)serialization failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Client-side validation failed before any backend call was made.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Remote procedure call reported a failure message.
    #[error("{0}")]
    Rpc(String),

    /// Realtime channel failed to open or dropped.
    #[error("Realtime channel error: {0}")]
    Channel(String),
}

impl SyncError {
    /// Whether this error is an authorization failure.
    #[must_use]
    pub const fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }

    /// Whether this error was raised before any backend round-trip.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Map an HTTP status + body into the right variant.
    #[must_use]
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::Unauthorized(message),
            404 => Self::NotFound(message),
            _ => Self::Api { status, message },
        }
    }
}

/// Result type alias for [`SyncError`].
pub type Result<T> = std::result::Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_maps_authorization() {
        assert!(SyncError::from_status(401, "expired".into()).is_authorization());
        assert!(SyncError::from_status(403, "not a member".into()).is_authorization());
        assert!(!SyncError::from_status(500, "boom".into()).is_authorization());
    }

    #[test]
    fn test_from_status_maps_not_found() {
        let err = SyncError::from_status(404, "no such list".into());
        assert!(matches!(err, SyncError::NotFound(_)));
    }

    #[test]
    fn test_display() {
        let err = SyncError::Api {
            status: 500,
            message: "internal".into(),
        };
        assert_eq!(err.to_string(), "API error (500): internal");

        let err = SyncError::Validation("name must not be empty".into());
        assert_eq!(err.to_string(), "Validation error: name must not be empty");
    }
}

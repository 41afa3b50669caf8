//! Client configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `LISTLY_API_URL` - Base URL of the hosted backend (e.g. `https://xyz.backend.example`)
//! - `LISTLY_API_KEY` - Project API key sent with every request
//!
//! ## Optional
//! - `LISTLY_DATA_DIR` - Directory for device-local storage (default: OS data dir + `/listly`)
//! - `LISTLY_PAGE_SIZE` - Item page size for paginated fetches (default: 20)
//! - `LISTLY_HTTP_TIMEOUT_SECS` - Request timeout in seconds (default: 30)

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

const DEFAULT_PAGE_SIZE: usize = 20;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
    #[error("No data directory available on this platform")]
    NoDataDir,
}

/// Client application configuration.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct Config {
    /// Base URL of the hosted backend
    pub api_url: Url,
    /// Project API key (sent as `apikey` header)
    pub api_key: SecretString,
    /// Directory for device-local key-value storage
    pub data_dir: PathBuf,
    /// Page size for paginated item fetches
    pub page_size: usize,
    /// HTTP request timeout
    pub http_timeout: Duration,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_url", &self.api_url.as_str())
            .field("api_key", &"[REDACTED]")
            .field("data_dir", &self.data_dir)
            .field("page_size", &self.page_size)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid,
    /// or if the API key looks like a placeholder.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let api_url = get_required_env("LISTLY_API_URL")?
            .parse::<Url>()
            .map_err(|e| ConfigError::InvalidEnvVar("LISTLY_API_URL".to_string(), e.to_string()))?;
        let api_key = get_validated_secret("LISTLY_API_KEY")?;

        let data_dir = match get_optional_env("LISTLY_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or(ConfigError::NoDataDir)?
                .join("listly"),
        };

        let page_size = get_env_or_default("LISTLY_PAGE_SIZE", &DEFAULT_PAGE_SIZE.to_string())
            .parse::<usize>()
            .map_err(|e| {
                ConfigError::InvalidEnvVar("LISTLY_PAGE_SIZE".to_string(), e.to_string())
            })?;
        if page_size == 0 {
            return Err(ConfigError::InvalidEnvVar(
                "LISTLY_PAGE_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let timeout_secs = get_env_or_default(
            "LISTLY_HTTP_TIMEOUT_SECS",
            &DEFAULT_HTTP_TIMEOUT_SECS.to_string(),
        )
        .parse::<u64>()
        .map_err(|e| {
            ConfigError::InvalidEnvVar("LISTLY_HTTP_TIMEOUT_SECS".to_string(), e.to_string())
        })?;

        Ok(Self {
            api_url,
            api_key,
            data_dir,
            page_size,
            http_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Get an optional environment variable.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Validate that a secret is not an obvious placeholder.
fn validate_secret(value: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = value.to_lowercase();
    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }
    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret(&value, key)?;
    Ok(SecretString::from(value))
}

//! HTTP implementation of the [`Gateway`] trait.
//!
//! Talks to the hosted backend's REST surface:
//! - `/auth/v1/*` - password sign-in/sign-up, logout
//! - `/rest/v1/{table}` - row CRUD with equality/IN filters, ordering, ranges
//! - `/rest/v1/rpc/{function}` - named server-side functions
//! - `/realtime/v1/stream` - line-delimited JSON change feed
//!
//! Every request carries the project `apikey` header plus a bearer token
//! (the session's access token once signed in, the api key before that).

use std::sync::{Arc, RwLock};

use futures::StreamExt;
use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::Config;
use crate::error::{Result, SyncError};

use super::{
    ChangeEvent, Filter, Gateway, Order, PageRange, Scope, Session, Subscription, Table,
};

/// Buffered change events per subscription before backpressure.
const FEED_CHANNEL_CAPACITY: usize = 64;

/// Client for the hosted backend's REST and realtime endpoints.
#[derive(Clone)]
pub struct HttpGateway {
    inner: Arc<HttpGatewayInner>,
}

struct HttpGatewayInner {
    client: reqwest::Client,
    base_url: Url,
    api_key: SecretString,
    auth_token: RwLock<Option<String>>,
}

impl HttpGateway {
    /// Create a new gateway from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(HttpGatewayInner {
                client,
                base_url: config.api_url.clone(),
                api_key: config.api_key.clone(),
                auth_token: RwLock::new(None),
            }),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.inner
            .base_url
            .join(path)
            .map_err(|e| SyncError::Api {
                status: 0,
                message: format!("invalid endpoint {path}: {e}"),
            })
    }

    fn bearer(&self) -> String {
        self.inner
            .auth_token
            .read()
            .ok()
            .and_then(|guard| guard.clone())
            .unwrap_or_else(|| self.inner.api_key.expose_secret().to_string())
    }

    fn request(&self, method: Method, url: Url) -> reqwest::RequestBuilder {
        self.inner
            .client
            .request(method, url)
            .header("apikey", self.inner.api_key.expose_secret())
            .bearer_auth(self.bearer())
    }

    /// Send a request and decode the JSON body, mapping backend failures
    /// onto [`SyncError`].
    async fn execute(&self, builder: reqwest::RequestBuilder) -> Result<Value> {
        let response = builder.send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(SyncError::RateLimited(retry_after));
        }

        // Read the body as text first for better error diagnostics
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_error_message(&body)
                .unwrap_or_else(|| body.chars().take(200).collect::<String>());
            warn!(status = %status, message = %message, "Backend returned non-success status");
            return Err(SyncError::from_status(status.as_u16(), message));
        }

        if body.is_empty() {
            return Ok(Value::Null);
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            SyncError::Parse(e)
        })
    }

    async fn execute_rows(&self, builder: reqwest::RequestBuilder) -> Result<Vec<Value>> {
        match self.execute(builder).await? {
            Value::Array(rows) => Ok(rows),
            Value::Null => Ok(Vec::new()),
            other => Ok(vec![other]),
        }
    }
}

#[async_trait::async_trait]
impl Gateway for HttpGateway {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/token?grant_type=password")?;
        let body = self
            .execute(self.request(Method::POST, url).json(&serde_json::json!({
                "email": email,
                "password": password,
            })))
            .await?;
        parse_auth_response(body)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let url = self.endpoint("auth/v1/signup")?;
        let body = self
            .execute(self.request(Method::POST, url).json(&serde_json::json!({
                "email": email,
                "password": password,
            })))
            .await?;
        parse_auth_response(body)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<()> {
        let url = self.endpoint("auth/v1/logout")?;
        self.execute(self.request(Method::POST, url)).await?;
        Ok(())
    }

    fn set_auth_token(&self, token: Option<String>) {
        if let Ok(mut guard) = self.inner.auth_token.write() {
            *guard = token;
        }
    }

    #[instrument(skip(self, filters, order, range), fields(table = %table))]
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
        range: Option<PageRange>,
    ) -> Result<Vec<Value>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let mut params: Vec<(String, String)> = vec![("select".to_string(), "*".to_string())];
        params.extend(filters.iter().map(filter_param));
        if let Some(order) = order {
            params.push((
                "order".to_string(),
                format!(
                    "{}.{}",
                    order.column,
                    if order.ascending { "asc" } else { "desc" }
                ),
            ));
        }
        if let Some(range) = range {
            params.push(("offset".to_string(), range.offset.to_string()));
            params.push(("limit".to_string(), range.limit.to_string()));
        }

        let rows = self
            .execute_rows(self.request(Method::GET, url).query(&params))
            .await?;
        debug!(count = rows.len(), "Selected rows");
        Ok(rows)
    }

    #[instrument(skip(self, rows), fields(table = %table, count = rows.len()))]
    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        self.execute_rows(
            self.request(Method::POST, url)
                .header("Prefer", "return=representation")
                .json(&rows),
        )
        .await
    }

    #[instrument(skip(self, filters, patch), fields(table = %table))]
    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
        self.execute_rows(
            self.request(Method::PATCH, url)
                .query(&params)
                .header("Prefer", "return=representation")
                .json(&patch),
        )
        .await
    }

    #[instrument(skip(self, rows), fields(table = %table, count = rows.len()))]
    async fn upsert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        self.execute_rows(
            self.request(Method::POST, url)
                .header("Prefer", "return=representation,resolution=merge-duplicates")
                .json(&rows),
        )
        .await
    }

    #[instrument(skip(self, filters), fields(table = %table))]
    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<()> {
        let url = self.endpoint(&format!("rest/v1/{table}"))?;
        let params: Vec<(String, String)> = filters.iter().map(filter_param).collect();
        self.execute(self.request(Method::DELETE, url).query(&params))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, params), fields(function = %function))]
    async fn rpc(&self, function: &str, params: Value) -> Result<Value> {
        let url = self.endpoint(&format!("rest/v1/rpc/{function}"))?;
        self.execute(self.request(Method::POST, url).json(&params))
            .await
    }

    #[instrument(skip(self, tables), fields(scope = %scope))]
    async fn subscribe(&self, scope: Scope, tables: &[Table]) -> Result<Subscription> {
        let url = self.endpoint("realtime/v1/stream")?;
        let table_list = tables
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",");
        let response = self
            .request(Method::GET, url)
            .query(&[
                ("scope".to_string(), scope.to_string()),
                ("tables".to_string(), table_list),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SyncError::Channel(format!(
                "subscribe failed ({status}): {}",
                message.chars().take(200).collect::<String>()
            )));
        }

        let (tx, rx) = mpsc::channel(FEED_CHANNEL_CAPACITY);
        let feeder = tokio::spawn(async move {
            let mut stream = response.bytes_stream();
            let mut buffer = String::new();
            while let Some(chunk) = stream.next().await {
                let chunk = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        // No automatic retry: log and leave the scope in
                        // last-known state until the next scope transition.
                        warn!(error = %e, "Realtime feed dropped");
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer.drain(..=pos).collect::<String>();
                    if let Some(event) = parse_feed_line(line.trim_end()) {
                        if tx.send(event).await.is_err() {
                            return; // subscriber dropped
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, Some(feeder)))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Render a filter as a query-string parameter (`col=eq.value` style).
fn filter_param(filter: &Filter) -> (String, String) {
    match filter {
        Filter::Eq(column, value) => (column.clone(), format!("eq.{}", value_literal(value))),
        Filter::In(column, values) => (
            column.clone(),
            format!(
                "in.({})",
                values.iter().map(value_literal).collect::<Vec<_>>().join(",")
            ),
        ),
    }
}

/// Bare literal form of a JSON value for filter parameters.
fn value_literal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Pull a human-readable message out of an error body.
///
/// The REST surface reports `{"message": ...}`, the auth surface
/// `{"error_description": ...}` or `{"msg": ...}`; fall back to `None` so
/// the caller can surface the raw body instead.
fn extract_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error_description", "msg", "error"]
        .iter()
        .find_map(|field| value.get(field))
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

/// Parse one line of the change feed.
///
/// Accepts both bare JSON lines and SSE-style `data: {...}` lines; blank
/// lines and comments are skipped. Malformed lines are logged and dropped
/// rather than tearing the channel down.
fn parse_feed_line(line: &str) -> Option<ChangeEvent> {
    let payload = line.strip_prefix("data:").map_or(line, str::trim_start);
    let payload = payload.trim();
    if payload.is_empty() || payload.starts_with(':') {
        return None;
    }
    match serde_json::from_str::<ChangeEvent>(payload) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(error = %e, line = %payload.chars().take(200).collect::<String>(),
                "Skipping malformed change-feed line");
            None
        }
    }
}

/// Auth endpoint response shape.
#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    expires_in: i64,
    user: AuthUser,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: listly_core::UserId,
    email: String,
}

fn parse_auth_response(body: Value) -> Result<Session> {
    let auth: AuthResponse = serde_json::from_value(body)?;
    Ok(Session {
        user_id: auth.user.id,
        email: auth.user.email,
        access_token: auth.access_token,
        expires_at: chrono::Utc::now() + chrono::Duration::seconds(auth.expires_in),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_param_eq() {
        let (key, value) = filter_param(&Filter::eq("list_id", "abc-123"));
        assert_eq!(key, "list_id");
        assert_eq!(value, "eq.abc-123");
    }

    #[test]
    fn test_filter_param_eq_bool() {
        let (_, value) = filter_param(&Filter::eq("purchased", true));
        assert_eq!(value, "eq.true");
    }

    #[test]
    fn test_filter_param_in() {
        let (key, value) = filter_param(&Filter::is_in(
            "id",
            vec![Value::from("a"), Value::from("b")],
        ));
        assert_eq!(key, "id");
        assert_eq!(value, "in.(a,b)");
    }

    #[test]
    fn test_extract_error_message_rest_shape() {
        let body = r#"{"message":"duplicate key value","code":"23505"}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("duplicate key value")
        );
    }

    #[test]
    fn test_extract_error_message_auth_shape() {
        let body = r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#;
        assert_eq!(
            extract_error_message(body).as_deref(),
            Some("Invalid login credentials")
        );
    }

    #[test]
    fn test_extract_error_message_falls_back_to_none() {
        assert!(extract_error_message("<html>502</html>").is_none());
        assert!(extract_error_message(r#"{"code": 42}"#).is_none());
        assert!(extract_error_message("").is_none());
    }

    #[test]
    fn test_parse_feed_line_bare_json() {
        let event = parse_feed_line(r#"{"event":"DELETE","table":"items","row":{}}"#).unwrap();
        assert_eq!(event.kind, super::super::ChangeKind::Delete);
    }

    #[test]
    fn test_parse_feed_line_sse_prefixed() {
        let event =
            parse_feed_line(r#"data: {"event":"INSERT","table":"comments","row":{}}"#).unwrap();
        assert_eq!(event.table, Table::Comments);
    }

    #[test]
    fn test_parse_feed_line_skips_noise() {
        assert!(parse_feed_line("").is_none());
        assert!(parse_feed_line(": keepalive").is_none());
        assert!(parse_feed_line("not json").is_none());
    }

    #[test]
    fn test_parse_auth_response() {
        let user_id = uuid::Uuid::new_v4();
        let body = serde_json::json!({
            "access_token": "tok-123",
            "expires_in": 3600,
            "user": { "id": user_id, "email": "a@b.c" },
        });
        let session = parse_auth_response(body).unwrap();
        assert_eq!(session.access_token, "tok-123");
        assert_eq!(session.email, "a@b.c");
        assert_eq!(session.user_id.as_uuid(), user_id);
        assert!(!session.is_expired());
    }
}

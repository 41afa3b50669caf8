//! Remote data gateway: the single I/O boundary to the hosted backend.
//!
//! # Architecture
//!
//! - [`Gateway`] is a dyn-safe trait covering the four capabilities the
//!   backend exposes: authentication, row operations, remote procedure
//!   calls, and the realtime change feed. It carries no business logic.
//! - [`http::HttpGateway`] implements it over the hosted REST backend.
//! - The integration-tests crate provides an in-memory implementation.
//!
//! Row payloads cross this boundary as loosely-typed JSON; the [`rows`]
//! module validates and normalizes them into the typed entities before
//! anything reaches the entity cache.

pub mod http;
pub mod rows;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use listly_core::{ListId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

pub use http::HttpGateway;

// =============================================================================
// Wire types
// =============================================================================

/// The named collections the backend exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    Lists,
    Items,
    ListMembers,
    Categories,
    Comments,
    PriceEntries,
    Notifications,
}

impl Table {
    /// Collection name on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lists => "lists",
            Self::Items => "items",
            Self::ListMembers => "list_members",
            Self::Categories => "categories",
            Self::Comments => "comments",
            Self::PriceEntries => "price_entries",
            Self::Notifications => "notifications",
        }
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row filter, applied server-side.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value.
    Eq(String, Value),
    /// Column is one of the given values.
    In(String, Vec<Value>),
}

impl Filter {
    /// Equality filter.
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq(column.into(), value.into())
    }

    /// Membership filter.
    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self::In(column.into(), values)
    }
}

/// Server-side ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Offset/limit window for paginated selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRange {
    pub offset: usize,
    pub limit: usize,
}

impl PageRange {
    /// Range for page `index` with `page_size` rows per page.
    #[must_use]
    pub const fn page(index: usize, page_size: usize) -> Self {
        Self {
            offset: index * page_size,
            limit: page_size,
        }
    }
}

// =============================================================================
// Auth
// =============================================================================

/// An authenticated session returned by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Whether the access token has passed its expiry.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

// =============================================================================
// Realtime
// =============================================================================

/// Partition of rows a realtime subscription pertains to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Changes on one list (items, members, comments).
    List(ListId),
    /// Changes addressed to one user (lists, categories, notifications).
    User(UserId),
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::List(id) => write!(f, "list:{id}"),
            Self::User(id) => write!(f, "user:{id}"),
        }
    }
}

/// Kind of row change pushed by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One change notification from the realtime feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "event")]
    pub kind: ChangeKind,
    pub table: Table,
    /// The filter-matched row (new row for insert/update, old row for delete).
    pub row: Value,
}

/// An open realtime channel yielding [`ChangeEvent`]s.
///
/// Dropping the subscription tears the channel down; any task feeding the
/// event stream is aborted.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    feeder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Assemble a subscription from a receiver and the optional task feeding it.
    #[must_use]
    pub fn new(events: mpsc::Receiver<ChangeEvent>, feeder: Option<JoinHandle<()>>) -> Self {
        Self { events, feeder }
    }

    /// Receive the next change event.
    ///
    /// Returns `None` once the channel has closed (feeder ended or errored).
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

// =============================================================================
// Gateway trait
// =============================================================================

/// Thin client over the hosted backend: auth, row CRUD, RPCs, realtime feed.
///
/// Pure I/O boundary; implementations must not apply business rules beyond
/// request shaping and row normalization.
#[async_trait]
pub trait Gateway: Send + Sync {
    // --- Auth ---

    /// Sign in with email and password.
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session>;

    /// Create an account and sign in.
    async fn sign_up(&self, email: &str, password: &str) -> Result<Session>;

    /// Invalidate the current session server-side.
    async fn sign_out(&self) -> Result<()>;

    /// Install (or clear) the bearer token used for subsequent calls.
    fn set_auth_token(&self, token: Option<String>);

    // --- Rows ---

    /// Select rows matching all `filters`.
    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
        range: Option<PageRange>,
    ) -> Result<Vec<Value>>;

    /// Insert rows, returning the created representations.
    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Patch rows matching `filters`, returning the updated representations.
    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<Vec<Value>>;

    /// Insert-or-update rows keyed on the table's primary key.
    async fn upsert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>>;

    /// Delete rows matching `filters`.
    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<()>;

    // --- RPC ---

    /// Invoke a named server-side function. Atomic from the caller's view.
    async fn rpc(&self, function: &str, params: Value) -> Result<Value>;

    // --- Realtime ---

    /// Open a change feed for `scope`, filtered to `tables`.
    async fn subscribe(&self, scope: Scope, tables: &[Table]) -> Result<Subscription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_wire_names() {
        assert_eq!(Table::ListMembers.as_str(), "list_members");
        assert_eq!(Table::PriceEntries.as_str(), "price_entries");
    }

    #[test]
    fn test_table_serde_matches_wire_names() {
        for table in [
            Table::Lists,
            Table::Items,
            Table::ListMembers,
            Table::Categories,
            Table::Comments,
            Table::PriceEntries,
            Table::Notifications,
        ] {
            let json = serde_json::to_string(&table).expect("serialize");
            assert_eq!(json, format!("\"{}\"", table.as_str()));
        }
    }

    #[test]
    fn test_page_range() {
        let range = PageRange::page(0, 20);
        assert_eq!(range.offset, 0);
        assert_eq!(range.limit, 20);

        let range = PageRange::page(3, 25);
        assert_eq!(range.offset, 75);
        assert_eq!(range.limit, 25);
    }

    #[test]
    fn test_change_event_parses_feed_payload() {
        let payload = serde_json::json!({
            "event": "INSERT",
            "table": "items",
            "row": { "name": "Milk" },
        });
        let event: ChangeEvent = serde_json::from_value(payload).expect("parse");
        assert_eq!(event.kind, ChangeKind::Insert);
        assert_eq!(event.table, Table::Items);
        assert_eq!(event.row["name"], "Milk");
    }

    #[test]
    fn test_scope_display() {
        let id = ListId::generate();
        assert_eq!(Scope::List(id).to_string(), format!("list:{id}"));
    }

    #[test]
    fn test_session_expiry() {
        let session = Session {
            user_id: UserId::generate(),
            email: "a@b.c".into(),
            access_token: "tok".into(),
            expires_at: Utc::now() - chrono::Duration::seconds(1),
        };
        assert!(session.is_expired());
    }
}

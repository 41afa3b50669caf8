//! Integration tests for the Listly synchronization core.
//!
//! The backend is replaced by [`MockGateway`], an in-memory implementation
//! of the gateway trait with the same observable behavior: filtered and
//! ordered selects, representation-returning writes, the server-side
//! functions the client calls, and a change feed routed by scope. Tests
//! drive a real [`AppContext`] against it, so everything above the gateway
//! (cache, orchestrator, realtime invalidator, ops) runs unmodified.
//!
//! Run with: `cargo test -p listly-integration-tests`

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::missing_panics_doc)]

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use listly_core::{ItemId, ListId, UserId};
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::sync::OwnedMutexGuard;

use listly_client::config::Config;
use listly_client::error::{Result, SyncError};
use listly_client::gateway::{
    ChangeEvent, ChangeKind, Filter, Gateway, Order, PageRange, Scope, Session, Subscription,
    Table,
};
use listly_client::AppContext;

const FEED_CAPACITY: usize = 64;

// =============================================================================
// Mock state
// =============================================================================

struct Account {
    user_id: UserId,
    password: String,
}

struct FeedSub {
    scope: Scope,
    tables: Vec<Table>,
    sender: mpsc::Sender<ChangeEvent>,
}

#[derive(Default)]
struct MockState {
    tables: HashMap<Table, Vec<Value>>,
    accounts: HashMap<String, Account>,
    sessions: HashMap<String, UserId>,
    auth_token: Option<String>,
    feeds: Vec<FeedSub>,
    select_counts: HashMap<Table, usize>,
    update_counts: HashMap<Table, usize>,
    insert_counts: HashMap<Table, usize>,
    rpc_counts: HashMap<String, usize>,
    select_failures: HashMap<Table, String>,
}

impl MockState {
    fn rows(&self, table: Table) -> &[Value] {
        self.tables.get(&table).map_or(&[], Vec::as_slice)
    }

    fn rows_mut(&mut self, table: Table) -> &mut Vec<Value> {
        self.tables.entry(table).or_default()
    }

    fn current_user(&self) -> Result<UserId> {
        self.auth_token
            .as_ref()
            .and_then(|token| self.sessions.get(token))
            .copied()
            .ok_or_else(|| SyncError::Unauthorized("no session".to_string()))
    }

    /// Push a change event to every open feed whose scope covers the row.
    fn emit(&mut self, kind: ChangeKind, table: Table, row: &Value) {
        // Comments carry no list_id; resolve it through the item.
        let comment_list = if table == Table::Comments {
            row.get("item_id").and_then(|item_id| {
                self.rows(Table::Items)
                    .iter()
                    .find(|item| item.get("id") == Some(item_id))
                    .and_then(|item| item.get("list_id"))
                    .cloned()
            })
        } else {
            None
        };

        for sub in &self.feeds {
            if !sub.tables.contains(&table) {
                continue;
            }
            let covered = match sub.scope {
                Scope::List(list) => {
                    let target = json!(list);
                    row.get("list_id") == Some(&target)
                        || comment_list.as_ref() == Some(&target)
                }
                Scope::User(user) => {
                    let target = json!(user);
                    let field = match table {
                        Table::Lists | Table::Categories => "owner_id",
                        Table::ListMembers | Table::Notifications => "user_id",
                        _ => continue,
                    };
                    row.get(field) == Some(&target)
                }
            };
            if covered {
                let _ = sub.sender.try_send(ChangeEvent {
                    kind,
                    table,
                    row: row.clone(),
                });
            }
        }
    }
}

fn row_matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| match filter {
        Filter::Eq(column, value) => row.get(column) == Some(value),
        Filter::In(column, values) => row.get(column).is_some_and(|v| values.contains(v)),
    })
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .unwrap_or(0.0)
            .total_cmp(&y.as_f64().unwrap_or(0.0)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}

fn merge_patch(row: &mut Value, patch: &Value) {
    if let (Some(fields), Some(patch_fields)) = (row.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_fields {
            fields.insert(key.clone(), value.clone());
        }
    }
}

// =============================================================================
// MockGateway
// =============================================================================

/// In-memory stand-in for the hosted backend.
pub struct MockGateway {
    state: Mutex<MockState>,
    /// Held across every select; tests can take it to stall reads and
    /// observe coalescing.
    read_gate: Arc<tokio::sync::Mutex<()>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            read_gate: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state poisoned")
    }

    /// Stall every select until the returned guard is dropped.
    pub async fn pause_reads(&self) -> OwnedMutexGuard<()> {
        Arc::clone(&self.read_gate).lock_owned().await
    }

    /// Total selects issued against `table`.
    #[must_use]
    pub fn select_count(&self, table: Table) -> usize {
        *self.lock().select_counts.get(&table).unwrap_or(&0)
    }

    /// Total updates issued against `table`.
    #[must_use]
    pub fn update_count(&self, table: Table) -> usize {
        *self.lock().update_counts.get(&table).unwrap_or(&0)
    }

    /// Total inserts issued against `table`.
    #[must_use]
    pub fn insert_count(&self, table: Table) -> usize {
        *self.lock().insert_counts.get(&table).unwrap_or(&0)
    }

    /// Times `function` was invoked.
    #[must_use]
    pub fn rpc_count(&self, function: &str) -> usize {
        *self.lock().rpc_counts.get(function).unwrap_or(&0)
    }

    /// Make the next select against `table` fail with `message`.
    pub fn fail_next_select(&self, table: Table, message: &str) {
        self.lock().select_failures.insert(table, message.to_string());
    }

    /// Register an account without opening a session.
    pub fn seed_account(&self, email: &str, password: &str) -> UserId {
        let user_id = UserId::generate();
        self.lock().accounts.insert(
            email.to_string(),
            Account {
                user_id,
                password: password.to_string(),
            },
        );
        user_id
    }

    /// Create a list with its owner membership row, bypassing auth and the
    /// change feed.
    pub fn seed_list(&self, owner: UserId, owner_email: &str, name: &str) -> ListId {
        let list_id = ListId::generate();
        let now = Utc::now();
        let mut state = self.lock();
        state.rows_mut(Table::Lists).push(json!({
            "id": list_id,
            "name": name,
            "owner_id": owner,
            "budget": null,
            "favorite": false,
            "created_at": now,
            "updated_at": now,
        }));
        state.rows_mut(Table::ListMembers).push(json!({
            "list_id": list_id,
            "user_id": owner,
            "role": "owner",
            "email": owner_email,
            "joined_at": now,
        }));
        list_id
    }

    /// Fill a list with `count` unpurchased items, bypassing the change
    /// feed.
    pub fn seed_items(&self, list_id: ListId, count: usize) -> Vec<ItemId> {
        let mut state = self.lock();
        let mut ids = Vec::with_capacity(count);
        for position in 0..count {
            let id = ItemId::generate();
            ids.push(id);
            state.rows_mut(Table::Items).push(json!({
                "id": id,
                "list_id": list_id,
                "name": format!("Item {position:03}"),
                "quantity": 1,
                "purchased": false,
                "price": null,
                "purchased_at": null,
                "category_id": null,
                "assigned_to": null,
                "position": position,
            }));
        }
        ids
    }

    fn open_session(state: &mut MockState, user_id: UserId, email: &str) -> Session {
        let access_token = format!("tok-{}", uuid::Uuid::new_v4());
        state.sessions.insert(access_token.clone(), user_id);
        Session {
            user_id,
            email: email.to_string(),
            access_token,
            expires_at: Utc::now() + Duration::hours(1),
        }
    }

    fn run_rpc(&self, function: &str, params: &Value) -> Result<Value> {
        match function {
            "create_list_with_owner" => {
                let mut state = self.lock();
                let owner = state.current_user()?;
                let email = state
                    .accounts
                    .iter()
                    .find(|(_, account)| account.user_id == owner)
                    .map(|(email, _)| email.clone())
                    .unwrap_or_default();

                let now = Utc::now();
                let list = json!({
                    "id": ListId::generate(),
                    "name": params["name"],
                    "owner_id": owner,
                    "budget": params.get("budget").cloned().unwrap_or(Value::Null),
                    "favorite": false,
                    "created_at": now,
                    "updated_at": now,
                });
                let member = json!({
                    "list_id": list["id"],
                    "user_id": owner,
                    "role": "owner",
                    "email": email,
                    "joined_at": now,
                });
                state.rows_mut(Table::Lists).push(list.clone());
                state.emit(ChangeKind::Insert, Table::Lists, &list);
                state.rows_mut(Table::ListMembers).push(member.clone());
                state.emit(ChangeKind::Insert, Table::ListMembers, &member);
                Ok(list)
            }
            "invite_user_by_email" => {
                let mut state = self.lock();
                let email = params["email"].as_str().unwrap_or_default().to_string();
                let Some(account) = state.accounts.get(&email) else {
                    return Err(SyncError::Rpc("user not found".to_string()));
                };
                let user_id = account.user_id;
                let list_id = params["list_id"].clone();

                let already_member = state
                    .rows(Table::ListMembers)
                    .iter()
                    .any(|row| row["list_id"] == list_id && row["user_id"] == json!(user_id));
                if already_member {
                    return Err(SyncError::Rpc("already a member".to_string()));
                }

                let member = json!({
                    "list_id": list_id,
                    "user_id": user_id,
                    "role": "member",
                    "email": email,
                    "joined_at": Utc::now(),
                });
                state.rows_mut(Table::ListMembers).push(member.clone());
                state.emit(ChangeKind::Insert, Table::ListMembers, &member);
                Ok(Value::Null)
            }
            "reset_purchase_history" => {
                let mut state = self.lock();
                let list_id = params["list_id"].clone();
                let reverted: Vec<Value> = state
                    .rows_mut(Table::Items)
                    .iter_mut()
                    .filter(|row| row["list_id"] == list_id)
                    .map(|row| {
                        merge_patch(
                            row,
                            &json!({ "purchased": false, "price": null, "purchased_at": null }),
                        );
                        row.clone()
                    })
                    .collect();

                let item_ids: Vec<Value> =
                    reverted.iter().map(|row| row["id"].clone()).collect();
                state
                    .rows_mut(Table::PriceEntries)
                    .retain(|row| !item_ids.contains(&row["item_id"]));

                for row in &reverted {
                    state.emit(ChangeKind::Update, Table::Items, row);
                }
                Ok(Value::Null)
            }
            other => Err(SyncError::Rpc(format!("unknown function: {other}"))),
        }
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.lock();
        let Some(account) = state.accounts.get(email) else {
            return Err(SyncError::Unauthorized("invalid credentials".to_string()));
        };
        if account.password != password {
            return Err(SyncError::Unauthorized("invalid credentials".to_string()));
        }
        let user_id = account.user_id;
        Ok(Self::open_session(&mut state, user_id, email))
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let mut state = self.lock();
        if state.accounts.contains_key(email) {
            return Err(SyncError::Api {
                status: 422,
                message: "email already registered".to_string(),
            });
        }
        let user_id = UserId::generate();
        state.accounts.insert(
            email.to_string(),
            Account {
                user_id,
                password: password.to_string(),
            },
        );
        Ok(Self::open_session(&mut state, user_id, email))
    }

    async fn sign_out(&self) -> Result<()> {
        let mut state = self.lock();
        if let Some(token) = state.auth_token.take() {
            state.sessions.remove(&token);
        }
        Ok(())
    }

    fn set_auth_token(&self, token: Option<String>) {
        self.lock().auth_token = token;
    }

    async fn select(
        &self,
        table: Table,
        filters: &[Filter],
        order: Option<Order>,
        range: Option<PageRange>,
    ) -> Result<Vec<Value>> {
        let _gate = self.read_gate.lock().await;
        let mut state = self.lock();
        *state.select_counts.entry(table).or_insert(0) += 1;

        if let Some(message) = state.select_failures.remove(&table) {
            return Err(SyncError::Api {
                status: 500,
                message,
            });
        }

        let mut rows: Vec<Value> = state
            .rows(table)
            .iter()
            .filter(|row| row_matches(row, filters))
            .cloned()
            .collect();

        if let Some(order) = order {
            rows.sort_by(|a, b| {
                let av = a.get(&order.column).unwrap_or(&Value::Null);
                let bv = b.get(&order.column).unwrap_or(&Value::Null);
                let ordering = compare_values(av, bv);
                if order.ascending {
                    ordering
                } else {
                    ordering.reverse()
                }
            });
        }

        if let Some(range) = range {
            rows = rows
                .into_iter()
                .skip(range.offset)
                .take(range.limit)
                .collect();
        }
        Ok(rows)
    }

    async fn insert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut state = self.lock();
        *state.insert_counts.entry(table).or_insert(0) += 1;
        for row in &rows {
            state.rows_mut(table).push(row.clone());
            state.emit(ChangeKind::Insert, table, row);
        }
        Ok(rows)
    }

    async fn update(&self, table: Table, filters: &[Filter], patch: Value) -> Result<Vec<Value>> {
        let mut state = self.lock();
        *state.update_counts.entry(table).or_insert(0) += 1;

        let updated: Vec<Value> = state
            .rows_mut(table)
            .iter_mut()
            .filter(|row| row_matches(row, filters))
            .map(|row| {
                merge_patch(row, &patch);
                row.clone()
            })
            .collect();
        for row in &updated {
            state.emit(ChangeKind::Update, table, row);
        }
        Ok(updated)
    }

    async fn upsert(&self, table: Table, rows: Vec<Value>) -> Result<Vec<Value>> {
        let mut state = self.lock();
        for row in &rows {
            let id = row.get("id").cloned();
            let existing = state
                .rows(table)
                .iter()
                .position(|candidate| id.is_some() && candidate.get("id") == id.as_ref());
            match existing {
                Some(index) => {
                    if let Some(slot) = state.rows_mut(table).get_mut(index) {
                        *slot = row.clone();
                    }
                }
                None => state.rows_mut(table).push(row.clone()),
            }
            state.emit(ChangeKind::Insert, table, row);
        }
        Ok(rows)
    }

    async fn delete(&self, table: Table, filters: &[Filter]) -> Result<()> {
        let mut state = self.lock();
        let removed: Vec<Value> = state
            .rows(table)
            .iter()
            .filter(|row| row_matches(row, filters))
            .cloned()
            .collect();
        state.rows_mut(table).retain(|row| !row_matches(row, filters));
        for row in &removed {
            state.emit(ChangeKind::Delete, table, row);
        }
        Ok(())
    }

    async fn rpc(&self, function: &str, params: Value) -> Result<Value> {
        *self
            .lock()
            .rpc_counts
            .entry(function.to_string())
            .or_insert(0) += 1;
        self.run_rpc(function, &params)
    }

    async fn subscribe(&self, scope: Scope, tables: &[Table]) -> Result<Subscription> {
        let (sender, receiver) = mpsc::channel(FEED_CAPACITY);
        let mut state = self.lock();
        state.feeds.retain(|sub| !sub.sender.is_closed());
        state.feeds.push(FeedSub {
            scope,
            tables: tables.to_vec(),
            sender,
        });
        Ok(Subscription::new(receiver, None))
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Password used for every test account.
pub const TEST_PASSWORD: &str = "correct-horse-battery";

/// Config pointing at nothing real; the gateway is always the mock.
#[must_use]
pub fn test_config(data_dir: &std::path::Path, page_size: usize) -> Config {
    Config {
        api_url: "http://mock.invalid".parse().expect("static url"),
        api_key: secrecy::SecretString::from("sb_anon_test_key"),
        data_dir: data_dir.to_path_buf(),
        page_size,
        http_timeout: std::time::Duration::from_secs(5),
    }
}

/// One client session: a real [`AppContext`] over a shared [`MockGateway`]
/// and a throwaway data directory.
pub struct TestApp {
    pub ctx: AppContext,
    pub gateway: Arc<MockGateway>,
    _data_dir: TempDir,
}

impl TestApp {
    #[must_use]
    pub fn new() -> Self {
        Self::with_gateway(Arc::new(MockGateway::new()), 20)
    }

    #[must_use]
    pub fn with_page_size(page_size: usize) -> Self {
        Self::with_gateway(Arc::new(MockGateway::new()), page_size)
    }

    /// Attach a fresh context (own cache, own data dir) to an existing
    /// gateway; two apps on one gateway model two devices on one backend.
    #[must_use]
    pub fn with_gateway(gateway: Arc<MockGateway>, page_size: usize) -> Self {
        let data_dir = TempDir::new().expect("temp data dir");
        let config = test_config(data_dir.path(), page_size);
        let ctx = AppContext::with_gateway(config, gateway.clone());
        Self {
            ctx,
            gateway,
            _data_dir: data_dir,
        }
    }

    /// Register and sign in a user.
    pub async fn sign_up(&self, email: &str) -> Session {
        self.ctx
            .auth()
            .sign_up(email, TEST_PASSWORD)
            .await
            .expect("sign up")
    }

    /// Sign in a previously seeded account.
    pub async fn sign_in(&self, email: &str) -> Session {
        self.ctx
            .auth()
            .sign_in(email, TEST_PASSWORD)
            .await
            .expect("sign in")
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

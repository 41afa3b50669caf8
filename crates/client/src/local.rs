//! Local persistence fallback: device-scoped key-value storage.
//!
//! Holds values with no server-side representation (the quick-buy budget,
//! list templates) and the persisted session used to bootstrap across runs.
//! Each key is one JSON file under the configured data directory.
//!
//! Failure policy per the consuming UI's expectations: reads fall back to
//! the default on absence *or* parse failure, writes log and swallow
//! errors. Nothing here is ever fatal.

use std::path::{Path, PathBuf};

use listly_core::ListTemplate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::gateway::Session;

const QUICK_BUY_BUDGET_KEY: &str = "quick_buy_budget";
const TEMPLATES_KEY: &str = "shopping_list_templates";
const SESSION_KEY: &str = "session";

/// JSON-file key-value store rooted at one directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    /// Create a store rooted at `dir`. The directory is created lazily on
    /// first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Root directory of the store.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read `key`, returning `default` when the file is absent or does not
    /// parse. Never errors to the caller.
    pub fn read<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let path = self.path_for(key);
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(key, error = %e, "Failed to read local entry; using default");
                }
                return default;
            }
        };
        match serde_json::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Local entry failed to parse; using default");
                default
            }
        }
    }

    /// Serialize and store `value` under `key`. Failures (e.g. storage
    /// quota) are logged, not propagated.
    pub fn write<T: Serialize>(&self, key: &str, value: &T) {
        let path = self.path_for(key);
        if let Err(e) = self.try_write(&path, value) {
            warn!(key, error = %e, "Failed to write local entry");
        } else {
            debug!(key, "Wrote local entry");
        }
    }

    /// Remove `key` entirely. Absence is not an error.
    pub fn remove(&self, key: &str) {
        let path = self.path_for(key);
        if let Err(e) = std::fs::remove_file(&path)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(key, error = %e, "Failed to remove local entry");
        }
    }

    fn try_write<T: Serialize>(&self, path: &Path, value: &T) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        // Write-then-rename so a torn write can't corrupt the entry.
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, path)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    // =========================================================================
    // Known keys
    // =========================================================================

    /// Client-side quick-buy budget; `None` when never set.
    #[must_use]
    pub fn quick_buy_budget(&self) -> Option<Decimal> {
        self.read(QUICK_BUY_BUDGET_KEY, None)
    }

    /// Persist the quick-buy budget.
    pub fn set_quick_buy_budget(&self, budget: Decimal) {
        self.write(QUICK_BUY_BUDGET_KEY, &Some(budget));
    }

    /// Stored list templates (offline-only artifacts; never synced).
    #[must_use]
    pub fn templates(&self) -> Vec<ListTemplate> {
        self.read(TEMPLATES_KEY, Vec::new())
    }

    /// Replace the stored template collection.
    pub fn set_templates(&self, templates: &[ListTemplate]) {
        self.write(TEMPLATES_KEY, &templates);
    }

    /// Session persisted from a previous run, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.read(SESSION_KEY, None)
    }

    /// Persist or clear the session.
    pub fn set_session(&self, session: Option<&Session>) {
        match session {
            Some(session) => self.write(SESSION_KEY, session),
            None => self.remove(SESSION_KEY),
        }
    }
}

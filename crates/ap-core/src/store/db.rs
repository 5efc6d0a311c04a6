//! Persistent storage for `Action` records using redb.
//!
//! # Table design
//!
//! ```text
//! actions      action_id  -> JSON-encoded Action
//! request_ids  request_id -> action_id
//! ```
//!
//! `request_ids` is a reservation table: `create_if_absent` checks and
//! writes both tables inside one write transaction, and redb runs write
//! transactions one at a time, so two submissions racing on the same
//! request_id cannot both insert. Lookups by request_id still go through a
//! filtered scan of `actions`, which is what detects a broken invariant.

use std::ops::Bound;
use std::path::Path;

use redb::{Database, ReadableTable, TableDefinition};

use crate::action::Action;
use crate::error::{ApError, Result};

use super::{ActionStore, ScanPage, SCAN_PAGE_SIZE};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const ACTIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("actions");
const REQUEST_IDS: TableDefinition<&str, &str> = TableDefinition::new("request_ids");

fn store_err(e: impl std::fmt::Display) -> ApError {
    ApError::Service(format!("status database: {e}"))
}

// ---------------------------------------------------------------------------
// ActionDb
// ---------------------------------------------------------------------------

/// Persistent store for `Action` records.
pub struct ActionDb {
    db: Database,
}

impl ActionDb {
    /// Open or create the redb database at `path`.
    ///
    /// Creates both tables if they don't already exist.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            crate::io::ensure_dir(parent)?;
        }
        let db = Database::create(path).map_err(store_err)?;
        // Ensure the tables exist before any reads
        let wt = db.begin_write().map_err(store_err)?;
        wt.open_table(ACTIONS).map_err(store_err)?;
        wt.open_table(REQUEST_IDS).map_err(store_err)?;
        wt.commit().map_err(store_err)?;
        Ok(Self { db })
    }

    /// Write raw bytes under `action_id`, bypassing validation.
    #[cfg(test)]
    pub(crate) fn put_raw(&self, action_id: &str, value: &[u8]) {
        let wt = self.db.begin_write().unwrap();
        {
            let mut table = wt.open_table(ACTIONS).unwrap();
            table.insert(action_id, value).unwrap();
        }
        wt.commit().unwrap();
    }
}

impl ActionStore for ActionDb {
    fn create_if_absent(&self, action: &Action) -> Result<()> {
        let value = serde_json::to_vec(action)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        let conflict = {
            let mut actions = wt.open_table(ACTIONS).map_err(store_err)?;
            let mut requests = wt.open_table(REQUEST_IDS).map_err(store_err)?;
            if actions
                .get(action.action_id.as_str())
                .map_err(store_err)?
                .is_some()
            {
                Some(format!("action ID '{}' already exists", action.action_id))
            } else if requests
                .get(action.request_id.as_str())
                .map_err(store_err)?
                .is_some()
            {
                Some(format!("request ID '{}' already exists", action.request_id))
            } else {
                actions
                    .insert(action.action_id.as_str(), value.as_slice())
                    .map_err(store_err)?;
                requests
                    .insert(action.request_id.as_str(), action.action_id.as_str())
                    .map_err(store_err)?;
                None
            }
        };
        if let Some(msg) = conflict {
            wt.abort().map_err(store_err)?;
            return Err(ApError::Conflict(msg));
        }
        wt.commit().map_err(store_err)?;
        tracing::info!(action_id = %action.action_id, "action status created");
        Ok(())
    }

    fn get(&self, action_id: &str) -> Result<Action> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;
        let Some(value) = table.get(action_id).map_err(store_err)? else {
            return Err(ApError::NotFound(format!(
                "action ID {action_id} not found in status database"
            )));
        };
        Ok(serde_json::from_slice(value.value())?)
    }

    fn scan(
        &self,
        filter: &dyn Fn(&Action) -> bool,
        start_after: Option<&str>,
    ) -> Result<ScanPage> {
        let rt = self.db.begin_read().map_err(store_err)?;
        let table = rt.open_table(ACTIONS).map_err(store_err)?;
        let range = match start_after {
            Some(key) => table.range::<&str>((Bound::Excluded(key), Bound::Unbounded)),
            None => table.range::<&str>(..),
        }
        .map_err(store_err)?;

        let mut page = ScanPage::default();
        let mut scanned = 0usize;
        for entry in range {
            let (k, v) = entry.map_err(store_err)?;
            let action: Action = serde_json::from_slice(v.value())?;
            scanned += 1;
            if filter(&action) {
                page.items.push(action);
            }
            if scanned == SCAN_PAGE_SIZE {
                page.last_key = Some(k.value().to_string());
                break;
            }
        }
        Ok(page)
    }

    fn replace(&self, action: &Action) -> Result<()> {
        let value = serde_json::to_vec(action)?;
        let wt = self.db.begin_write().map_err(store_err)?;
        let missing = {
            let mut actions = wt.open_table(ACTIONS).map_err(store_err)?;
            let exists = actions
                .get(action.action_id.as_str())
                .map_err(store_err)?
                .is_some();
            if exists {
                actions
                    .insert(action.action_id.as_str(), value.as_slice())
                    .map_err(store_err)?;
            }
            !exists
        };
        if missing {
            wt.abort().map_err(store_err)?;
            return Err(ApError::NotFound(format!(
                "action ID {} not found in status database",
                action.action_id
            )));
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }

    fn remove(&self, action_id: &str) -> Result<()> {
        let wt = self.db.begin_write().map_err(store_err)?;
        let found = {
            let mut actions = wt.open_table(ACTIONS).map_err(store_err)?;
            let mut requests = wt.open_table(REQUEST_IDS).map_err(store_err)?;
            let request_id = actions
                .get(action_id)
                .map_err(store_err)?
                .map(|v| {
                    serde_json::from_slice::<serde_json::Value>(v.value())
                        .ok()
                        .and_then(|j| j["request_id"].as_str().map(str::to_string))
                });
            match request_id {
                None => false,
                Some(request_id) => {
                    actions.remove(action_id).map_err(store_err)?;
                    if let Some(request_id) = request_id {
                        requests.remove(request_id.as_str()).map_err(store_err)?;
                    }
                    true
                }
            }
        };
        if !found {
            wt.abort().map_err(store_err)?;
            return Err(ApError::NotFound(format!(
                "action ID {action_id} not found in status database"
            )));
        }
        wt.commit().map_err(store_err)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

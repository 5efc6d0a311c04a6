//! Durable persistence of `Action` records.
//!
//! Backends implement the primitive operations (`create_if_absent`, `get`,
//! `scan`, `replace`, `remove`); the request-id lookup, patching, verified
//! deletion and id generation are provided on top of them so every backend
//! shares the same semantics.

pub mod db;

pub use db::ActionDb;

use serde_json::Value;

use crate::action::Action;
use crate::error::{ApError, Result};

/// Records examined per `scan` page.
pub const SCAN_PAGE_SIZE: usize = 100;

/// Attempts `generate_unique_id` makes before giving up.
pub const MAX_ID_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateMode {
    /// Deep-merge the patch; fields absent from the patch are kept.
    Merge,
    /// Replace the whole record with the patch.
    Overwrite,
}

/// One page of a filtered scan.
#[derive(Debug, Default)]
pub struct ScanPage {
    pub items: Vec<Action>,
    /// Key to pass as `start_after` for the next page; `None` when exhausted.
    pub last_key: Option<String>,
}

pub trait ActionStore: Send + Sync {
    /// Insert `action`; `Conflict` if its action_id exists or its request_id
    /// is already taken. Atomic.
    fn create_if_absent(&self, action: &Action) -> Result<()>;

    /// `NotFound` if absent.
    fn get(&self, action_id: &str) -> Result<Action>;

    /// Examine up to [`SCAN_PAGE_SIZE`] records after `start_after` and
    /// return those matching `filter`.
    fn scan(&self, filter: &dyn Fn(&Action) -> bool, start_after: Option<&str>)
        -> Result<ScanPage>;

    /// Unconditionally rewrite an existing record; `NotFound` if absent.
    fn replace(&self, action: &Action) -> Result<()>;

    /// `NotFound` if absent.
    fn remove(&self, action_id: &str) -> Result<()>;

    /// Page through the whole store looking for `request_id`.
    ///
    /// More than one match means the uniqueness invariant is broken; that is
    /// reported, never resolved by picking one.
    fn find_by_request_id(&self, request_id: &str) -> Result<Action> {
        let filter = |a: &Action| a.request_id == request_id;
        let mut found = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let page = self.scan(&filter, cursor.as_deref())?;
            found.extend(page.items);
            match page.last_key {
                Some(key) => cursor = Some(key),
                None => break,
            }
        }

        let mut found = found.into_iter();
        match (found.next(), found.next()) {
            (None, _) => Err(ApError::NotFound(format!(
                "request ID '{request_id}' not found in status database"
            ))),
            (Some(action), None) => Ok(action),
            (Some(_), Some(_)) => {
                tracing::error!(request_id, "multiple actions share one request ID");
                Err(ApError::Internal(format!(
                    "multiple entries found for request ID '{request_id}'"
                )))
            }
        }
    }

    /// Apply `patch` to an existing record and return the stored result.
    fn update(&self, action_id: &str, patch: &Value, mode: UpdateMode) -> Result<Action> {
        let existing = self.get(action_id)?;
        let candidate = match mode {
            UpdateMode::Merge => {
                let mut base = serde_json::to_value(&existing)?;
                merge_json(&mut base, patch);
                base
            }
            UpdateMode::Overwrite => patch.clone(),
        };
        let updated: Action = serde_json::from_value(candidate)
            .map_err(|e| ApError::InvalidRequest(format!("invalid status update: {e}")))?;
        if updated.action_id != existing.action_id || updated.request_id != existing.request_id {
            return Err(ApError::InvalidRequest(
                "status update may not change action_id or request_id".into(),
            ));
        }
        self.replace(&updated)?;
        tracing::debug!(action_id, status = %updated.status, "action status updated");
        Ok(updated)
    }

    /// Remove a record and confirm it is gone.
    fn delete(&self, action_id: &str) -> Result<()> {
        self.remove(action_id)?;
        match self.get(action_id) {
            Err(e) if e.is_not_found() => {
                tracing::info!(action_id, "action status deleted");
                Ok(())
            }
            Ok(_) => {
                tracing::error!(action_id, "action status still present after deletion");
                Err(ApError::Internal("action status was not deleted".into()))
            }
            Err(e) => Err(e),
        }
    }

    /// A fresh action_id not currently present in the store.
    fn generate_unique_id(&self) -> Result<String> {
        unique_id_with(self, || uuid::Uuid::new_v4().simple().to_string())
    }
}

/// Check `store` against candidates from `generate` until one is unused.
///
/// This check is advisory: `create_if_absent` is what actually rejects a
/// duplicate.
pub fn unique_id_with<S, G>(store: &S, mut generate: G) -> Result<String>
where
    S: ActionStore + ?Sized,
    G: FnMut() -> String,
{
    for _ in 0..MAX_ID_ATTEMPTS {
        let candidate = generate();
        match store.get(&candidate) {
            Err(e) if e.is_not_found() => return Ok(candidate),
            Ok(_) => {
                tracing::warn!(candidate = %candidate, "generated action ID collided, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(ApError::Service(format!(
        "unable to generate a unique action ID after {MAX_ID_ATTEMPTS} attempts"
    )))
}

/// Recursively merge `patch` into `base`: objects merge key by key, any
/// other value in `patch` replaces the one in `base`.
pub fn merge_json(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (k, v) in patch {
                match base.get_mut(k) {
                    Some(existing) => merge_json(existing, v),
                    None => {
                        base.insert(k.clone(), v.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

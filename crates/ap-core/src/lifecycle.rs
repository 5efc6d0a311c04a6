//! The Action state machine: idempotent submission, status retrieval,
//! cancel, release, and the single terminal write made by an executor.
//!
//! ```text
//! submit ──► ACTIVE ──complete──► SUCCEEDED ──release──► (deleted)
//!                  └─complete──► FAILED    ──release──► (deleted)
//! ```
//!
//! A new Action is handed out together with an [`ActionLease`]. The lease is
//! the only way to reach [`ActionLifecycle::complete`], and `complete`
//! consumes it, so at most one terminal write per Action can be expressed.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::action::{Action, ActionBody, ActionDetails, ActionStatus, Operation};
use crate::auth::{self, Caller, PrincipalSet};
use crate::error::{ApError, Result};
use crate::store::{ActionStore, UpdateMode, MAX_ID_ATTEMPTS};

// ---------------------------------------------------------------------------
// Requests, jobs, outcomes
// ---------------------------------------------------------------------------

/// Defaults applied when a submission leaves them out.
#[derive(Debug, Clone, Copy)]
pub struct LifecyclePolicy {
    pub default_release_after: Duration,
    /// Shortest time any action is expected to take; deadlines closer than
    /// `now + estimated_runtime` are refused.
    pub estimated_runtime: Duration,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            default_release_after: Duration::days(30),
            estimated_runtime: Duration::days(1),
        }
    }
}

/// One submission as received from a caller.
///
/// Everything except `request_id` is kept raw and only interpreted once the
/// request_id is known to be new; a replay returns the stored Action without
/// looking at the rest.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub request_id: String,
    pub body: Value,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub manage_by: Option<Value>,
    #[serde(default)]
    pub monitor_by: Option<Value>,
    #[serde(default)]
    pub release_after: Option<String>,
    #[serde(default)]
    pub deadline: Option<String>,
}

impl SubmitRequest {
    pub fn new(request_id: impl Into<String>, body: Value) -> Self {
        Self {
            request_id: request_id.into(),
            body,
            label: None,
            manage_by: None,
            monitor_by: None,
            release_after: None,
            deadline: None,
        }
    }
}

/// Exclusive right to write the terminal status of one Action.
///
/// Deliberately neither `Clone` nor constructible outside this crate.
#[derive(Debug)]
pub struct ActionLease {
    action_id: String,
}

impl ActionLease {
    pub(crate) fn new(action_id: String) -> Self {
        Self { action_id }
    }

    pub fn action_id(&self) -> &str {
        &self.action_id
    }
}

/// Work to run for a newly created Action.
#[derive(Debug)]
pub struct Job {
    pub lease: ActionLease,
    pub body: ActionBody,
}

#[derive(Debug)]
pub struct Submission {
    pub action: Action,
    /// `None` on replay: the request_id was already known.
    pub job: Option<Job>,
}

impl Submission {
    pub fn is_new(&self) -> bool {
        self.job.is_some()
    }
}

/// Terminal result of a Job.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Succeeded(ActionDetails),
    Failed(String),
}

impl Outcome {
    fn into_parts(self) -> (ActionStatus, ActionDetails) {
        match self {
            Outcome::Succeeded(details) => (ActionStatus::Succeeded, details),
            Outcome::Failed(error) => (ActionStatus::Failed, ActionDetails::failed(error)),
        }
    }
}

// ---------------------------------------------------------------------------
// ActionLifecycle
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ActionLifecycle {
    store: Arc<dyn ActionStore>,
    policy: LifecyclePolicy,
}

impl ActionLifecycle {
    pub fn new(store: Arc<dyn ActionStore>, policy: LifecyclePolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn ActionStore> {
        &self.store
    }

    /// Create an Action for `request`, or return the one already created for
    /// its request_id.
    pub fn submit(&self, request: SubmitRequest, caller: &Caller) -> Result<Submission> {
        let request_id = request.request_id.as_str();
        if request_id.trim().is_empty() {
            return Err(ApError::InvalidRequest("request_id must not be empty".into()));
        }
        if let Some(existing) = self.lookup(request_id)? {
            tracing::info!(request_id, action_id = %existing.action_id, "replaying known request");
            return Ok(Submission {
                action: existing,
                job: None,
            });
        }

        let body = parse_body(&request.body)?;
        let now = Utc::now();
        let manage_by = principals_or_caller(request.manage_by.as_ref(), caller, "manage_by")?;
        let monitor_by = principals_or_caller(request.monitor_by.as_ref(), caller, "monitor_by")?;
        let release_after = match request.release_after.as_deref() {
            Some(raw) => {
                let d = crate::duration::parse(raw)?;
                if d < Duration::zero() {
                    return Err(ApError::InvalidRequest(
                        "release_after must not be negative".into(),
                    ));
                }
                d
            }
            None => self.policy.default_release_after,
        };
        if let Some(raw) = request.deadline.as_deref() {
            let deadline = DateTime::parse_from_rfc3339(raw)
                .map_err(|e| ApError::InvalidRequest(format!("invalid deadline '{raw}': {e}")))?
                .with_timezone(&Utc);
            let estimate = now + self.policy.estimated_runtime;
            if deadline < estimate {
                return Err(ApError::InvalidRequest(format!(
                    "deadline {} is before estimated completion time {}",
                    deadline.to_rfc3339(),
                    estimate.to_rfc3339()
                )));
            }
        }

        for _ in 0..MAX_ID_ATTEMPTS {
            let action = Action {
                action_id: self.store.generate_unique_id()?,
                request_id: request.request_id.clone(),
                status: ActionStatus::Active,
                creator_id: caller.primary_identity().to_string(),
                manage_by: manage_by.clone(),
                monitor_by: monitor_by.clone(),
                label: request.label.clone(),
                release_after,
                details: ActionDetails::started(),
                created_at: now,
                updated_at: now,
            };
            match self.store.create_if_absent(&action) {
                Ok(()) => {
                    tracing::info!(
                        request_id,
                        action_id = %action.action_id,
                        operation = body.operation.as_str(),
                        "action accepted"
                    );
                    let lease = ActionLease::new(action.action_id.clone());
                    return Ok(Submission {
                        action,
                        job: Some(Job { lease, body }),
                    });
                }
                Err(ApError::Conflict(reason)) => {
                    // Either another submission won the request_id, or the
                    // generated action_id was taken in the meantime.
                    tracing::debug!(request_id, %reason, "create lost a race");
                    if let Some(winner) = self.lookup(request_id)? {
                        return Ok(Submission {
                            action: winner,
                            job: None,
                        });
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(ApError::Service(
            "unable to create action after repeated conflicts".into(),
        ))
    }

    pub fn get_status(&self, action_id: &str, caller: &Caller) -> Result<Action> {
        let action = self.store.get(action_id)?;
        auth::require(caller, &action.monitor_by, || {
            format!("caller may not view status of action {action_id}")
        })?;
        Ok(action)
    }

    /// Cancellation is not wired to running work: an authorized cancel of an
    /// active Action returns its current status and changes nothing.
    pub fn cancel(&self, action_id: &str, caller: &Caller) -> Result<Action> {
        let action = self.store.get(action_id)?;
        auth::require(caller, &action.manage_by, || {
            format!("caller may not cancel action {action_id}")
        })?;
        if action.status.is_terminal() {
            return Err(ApError::InvalidState(format!(
                "action {action_id} is already {}",
                action.status
            )));
        }
        self.store.get(action_id)
    }

    /// Delete a finished Action and return its last snapshot.
    pub fn release(&self, action_id: &str, caller: &Caller) -> Result<Action> {
        let action = self.store.get(action_id)?;
        auth::require(caller, &action.manage_by, || {
            format!("caller may not release action {action_id}")
        })?;
        if !action.status.is_terminal() {
            return Err(ApError::InvalidState(format!(
                "action {action_id} is {} and cannot be released until it finishes",
                action.status
            )));
        }
        self.store.delete(action_id)?;
        tracing::info!(action_id, status = %action.status, "action released");
        Ok(action)
    }

    /// Write the terminal status for the leased Action.
    pub fn complete(&self, lease: ActionLease, outcome: Outcome) -> Result<Action> {
        let ActionLease { action_id } = lease;
        let current = self.store.get(&action_id)?;
        if current.status != ActionStatus::Active {
            return Err(ApError::InvalidState(format!(
                "action {action_id} is {}, not ACTIVE",
                current.status
            )));
        }
        let (status, details) = outcome.into_parts();
        let patch = json!({
            "status": status,
            "details": details,
            "updated_at": Utc::now(),
        });
        let updated = self.store.update(&action_id, &patch, UpdateMode::Merge)?;
        tracing::info!(action_id = %action_id, status = %updated.status, "action finished");
        Ok(updated)
    }

    fn lookup(&self, request_id: &str) -> Result<Option<Action>> {
        match self.store.find_by_request_id(request_id) {
            Ok(action) => Ok(Some(action)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Parse an action body and check the fields its operation needs.
pub fn parse_body(raw: &Value) -> Result<ActionBody> {
    let body: ActionBody = serde_json::from_value(raw.clone())
        .map_err(|e| ApError::InvalidRequest(format!("invalid action body: {e}")))?;
    let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
    match body.operation {
        Operation::Ingest | Operation::Restore => {
            if blank(&body.data_url) {
                return Err(ApError::InvalidRequest(format!(
                    "'data_url' is required for {}",
                    body.operation.as_str()
                )));
            }
        }
        Operation::Modify => {
            if blank(&body.catalog_id) {
                return Err(ApError::InvalidRequest(
                    "'catalog_id' is required for modify".into(),
                ));
            }
            if body.catalog_acls.as_ref().map_or(true, |acls| acls.is_empty()) {
                return Err(ApError::InvalidRequest(
                    "modify requires a change to make ('catalog_acls')".into(),
                ));
            }
        }
    }
    Ok(body)
}

fn principals_or_caller(raw: Option<&Value>, caller: &Caller, field: &str) -> Result<PrincipalSet> {
    match raw {
        None | Some(Value::Null) => Ok(caller.identities().clone()),
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| ApError::InvalidRequest(format!("invalid {field}: {e}"))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

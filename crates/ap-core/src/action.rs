//! Action data model.
//!
//! An `Action` is one tracked unit of asynchronous work (ingest, restore or
//! modify). It is created `Active` by the lifecycle, written exactly once to a
//! terminal status by the executor that owns it, and deleted on release.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::PrincipalSet;

// ---------------------------------------------------------------------------
// ActionStatus
// ---------------------------------------------------------------------------

/// Transitions: `Active → Succeeded | Failed`. `Inactive` is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionStatus {
    Active,
    Inactive,
    Succeeded,
    Failed,
}

impl ActionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ActionStatus::Succeeded | ActionStatus::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Active => "ACTIVE",
            ActionStatus::Inactive => "INACTIVE",
            ActionStatus::Succeeded => "SUCCEEDED",
            ActionStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ActionDetails
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Backend catalog identifier. Always an integer on the way out.
    #[serde(
        default,
        deserialize_with = "deserialize_catalog_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub catalog_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionDetails {
    pub fn started() -> Self {
        Self {
            message: Some("Action started".into()),
            ..Self::default()
        }
    }

    pub fn succeeded(message: impl Into<String>, catalog_id: i64, link: String) -> Self {
        Self {
            message: Some(message.into()),
            catalog_id: Some(catalog_id),
            catalog_link: Some(link),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            message: Some("Action failed".into()),
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

/// Accepts `42`, `42.0` and `"42"`; stores written by other tooling are not
/// consistent about numeric encoding.
fn deserialize_catalog_id<'de, D>(d: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(d)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(v) => catalog_id_from_value(&v)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid catalog id: {v}"))),
    }
}

/// Integer view of a JSON catalog identifier, if it has one.
pub fn catalog_id_from_value(v: &serde_json::Value) -> Option<i64> {
    match v {
        serde_json::Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub action_id: String,
    pub request_id: String,
    pub status: ActionStatus,
    pub creator_id: String,
    pub manage_by: PrincipalSet,
    pub monitor_by: PrincipalSet,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(with = "crate::duration::iso8601")]
    pub release_after: Duration,
    #[serde(default)]
    pub details: ActionDetails,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// ActionBody
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Ingest,
    Restore,
    Modify,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Ingest => "ingest",
            Operation::Restore => "restore",
            Operation::Modify => "modify",
        }
    }
}

/// Access-control lists keyed by ACL name (`owner`, `select`, ...).
pub type CatalogAcls = BTreeMap<String, Vec<String>>;

/// What the caller asked to be done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionBody {
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_url: Option<String>,
    /// Numeric catalog id or the alias of a configured known catalog.
    #[serde(
        default,
        deserialize_with = "deserialize_catalog_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub catalog_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog_acls: Option<CatalogAcls>,
}

fn deserialize_catalog_ref<'de, D>(d: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<serde_json::Value> = Option::deserialize(d)?;
    match raw {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(s)) => Ok(Some(s)),
        Some(serde_json::Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "catalog_id must be a string or integer, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_value(ActionStatus::Succeeded).unwrap(),
            json!("SUCCEEDED")
        );
        assert!(ActionStatus::Failed.is_terminal());
        assert!(!ActionStatus::Inactive.is_terminal());
    }

    #[test]
    fn catalog_id_decodes_leniently_and_encodes_as_integer() {
        for raw in [json!(42), json!(42.0), json!("42")] {
            let details: ActionDetails =
                serde_json::from_value(json!({ "catalog_id": raw })).unwrap();
            assert_eq!(details.catalog_id, Some(42));
            let out = serde_json::to_value(&details).unwrap();
            assert_eq!(out["catalog_id"], json!(42));
        }
    }

    #[test]
    fn fractional_catalog_id_is_rejected() {
        let res: Result<ActionDetails, _> = serde_json::from_value(json!({ "catalog_id": 4.5 }));
        assert!(res.is_err());
    }

    #[test]
    fn body_accepts_numeric_catalog_id() {
        let body: ActionBody =
            serde_json::from_value(json!({ "operation": "modify", "catalog_id": 12 })).unwrap();
        assert_eq!(body.catalog_id.as_deref(), Some("12"));
    }

    #[test]
    fn body_rejects_unknown_operation() {
        let res: Result<ActionBody, _> = serde_json::from_value(json!({ "operation": "delete" }));
        assert!(res.is_err());
    }
}

use ap_core::auth::{self, Caller};
use axum::{extract::State, Extension, Json};
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

/// GET /ping — liveness, no authentication.
pub async fn ping() -> Json<Value> {
    Json(json!({ "success": true }))
}

/// GET / — provider description for callers in `visible_to`.
pub async fn describe(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> Result<Json<Value>, AppError> {
    let provider = &app.config.provider;
    if !auth::is_authorized(&caller, &provider.visible_to, true) {
        return Err(AppError::forbidden(format!(
            "{} may not view this action provider",
            caller.primary_identity()
        )));
    }
    Ok(Json(json!({
        "types": ["Action"],
        "api_version": "1.0",
        "title": provider.title,
        "subtitle": provider.subtitle,
        "admin_contact": provider.admin_contact,
        "synchronous": false,
        "log_supported": false,
        "visible_to": provider.visible_to,
        "runnable_by": provider.runnable_by,
        "input_schema": input_schema(),
    })))
}

fn input_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["operation"],
        "properties": {
            "operation": {
                "type": "string",
                "enum": ["ingest", "restore", "modify"],
            },
            "data_url": { "type": "string" },
            "catalog_id": { "type": ["string", "integer"] },
            "server": { "type": "string" },
            "catalog_acls": {
                "type": "object",
                "additionalProperties": {
                    "type": "array",
                    "items": { "type": "string" },
                },
            },
        },
    })
}

use ap_core::auth::{self, Caller};
use ap_core::{Action, SubmitRequest, Submission};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use super::blocking;
use crate::error::AppError;
use crate::state::AppState;

/// POST /run — submit a new Action, or replay an earlier one with the same
/// request_id. New work is answered 202, a replay 200.
pub async fn run(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Bytes,
) -> Result<(StatusCode, Json<Action>), AppError> {
    if !auth::is_authorized(&caller, &app.config.provider.runnable_by, true) {
        return Err(AppError::forbidden(format!(
            "{} may not run this action provider",
            caller.primary_identity()
        )));
    }
    let request: SubmitRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::bad_request(format!("invalid run request: {e}")))?;

    // Submit and dispatch run on their own task: once the Action is stored its
    // Job must reach the pool even if this request is abandoned.
    let lifecycle = app.lifecycle.clone();
    let pool = app.pool.clone();
    let (action, accepted) = tokio::spawn(async move {
        let Submission { action, job } =
            blocking(move || lifecycle.submit(request, &caller)).await?;
        let accepted = match job {
            Some(job) => {
                tracing::info!(action_id = %action.action_id, "action accepted");
                pool.dispatch(job).await;
                true
            }
            None => false,
        };
        Ok::<_, AppError>((action, accepted))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    let status = if accepted {
        StatusCode::ACCEPTED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(action)))
}

/// GET /{action_id}/status
pub async fn status(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(action_id): Path<String>,
) -> Result<Json<Action>, AppError> {
    let lifecycle = app.lifecycle.clone();
    let action = blocking(move || lifecycle.get_status(&action_id, &caller)).await?;
    Ok(Json(action))
}

/// POST /{action_id}/cancel
pub async fn cancel(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(action_id): Path<String>,
) -> Result<Json<Action>, AppError> {
    let lifecycle = app.lifecycle.clone();
    let action = blocking(move || lifecycle.cancel(&action_id, &caller)).await?;
    Ok(Json(action))
}

/// POST /{action_id}/release
pub async fn release(
    State(app): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(action_id): Path<String>,
) -> Result<Json<Action>, AppError> {
    let lifecycle = app.lifecycle.clone();
    let action = blocking(move || lifecycle.release(&action_id, &caller)).await?;
    tracing::info!(action_id = %action.action_id, "action released");
    Ok(Json(action))
}

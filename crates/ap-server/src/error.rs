use ap_core::ApError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Wrapper that lets any `anyhow::Error` be returned from a handler.
///
/// `ApError` causes are mapped to their HTTP status; anything else is a 500.
/// The body is always `{"error": "<message>"}`.
pub struct AppError(pub anyhow::Error);

impl AppError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(ApError::InvalidRequest(msg.into()).into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self(ApError::NotAuthorized(msg.into()).into())
    }
}

fn status_for(err: &ApError) -> StatusCode {
    match err {
        ApError::InvalidRequest(_) | ApError::UnsupportedType(_) => StatusCode::BAD_REQUEST,
        ApError::NotAuthorized(_) => StatusCode::FORBIDDEN,
        ApError::NotFound(_) => StatusCode::NOT_FOUND,
        ApError::InvalidState(_) | ApError::Conflict(_) => StatusCode::CONFLICT,
        ApError::Service(_) => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self
            .0
            .downcast_ref::<ApError>()
            .map(status_for)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), error = %self.0, "request failed");
        }
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

impl<E: Into<anyhow::Error>> From<E> for AppError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

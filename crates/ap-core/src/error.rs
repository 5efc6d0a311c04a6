use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not authorized: {0}")]
    NotAuthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service error: {0}")]
    Service(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("mapping undefined for type '{0}'")]
    UnsupportedType(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl ApError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ApError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, ApError>;

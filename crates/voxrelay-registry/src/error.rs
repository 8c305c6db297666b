//! Error type for the registry process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown app: {0}")]
    UnknownApp(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("app unreachable: {0}")]
    AppUnreachable(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub fn internal(msg: impl Into<String>) -> Self {
        RegistryError::Internal(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        RegistryError::Unauthorized(msg.into())
    }
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::UnknownApp(_) => StatusCode::NOT_FOUND,
            RegistryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            RegistryError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            RegistryError::AppUnreachable(_) => StatusCode::BAD_GATEWAY,
            RegistryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

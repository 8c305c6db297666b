//! Error type for the telephony adapter process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, TelephonyError>;

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("carrier rejected: {0}")]
    CarrierRejected(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl TelephonyError {
    pub fn internal(msg: impl Into<String>) -> Self {
        TelephonyError::Internal(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        TelephonyError::Unauthorized(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        TelephonyError::InvalidRequest(msg.into())
    }
}

impl IntoResponse for TelephonyError {
    fn into_response(self) -> Response {
        let status = match &self {
            TelephonyError::UnknownStream(_) => StatusCode::NOT_FOUND,
            TelephonyError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            TelephonyError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            TelephonyError::CarrierRejected(_) => StatusCode::FORBIDDEN,
            TelephonyError::Transport(_) | TelephonyError::Database(_) | TelephonyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

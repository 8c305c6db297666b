//! Error type for the voice bridge process.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("stt provider failure: {0}")]
    SttFailure(String),

    #[error("tts provider failure: {0}")]
    TtsFailure(String),

    #[error("unsupported audio format")]
    UnsupportedFormat,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    pub fn internal(msg: impl Into<String>) -> Self {
        BridgeError::Internal(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        BridgeError::Unauthorized(msg.into())
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = match &self {
            BridgeError::UnknownSession(_) => StatusCode::NOT_FOUND,
            BridgeError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BridgeError::UnsupportedFormat => StatusCode::BAD_REQUEST,
            BridgeError::SttFailure(_) | BridgeError::TtsFailure(_) | BridgeError::Transport(_) | BridgeError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

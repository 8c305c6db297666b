//! Error type for the scheduler process.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SchedulerError>;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn internal(msg: impl Into<String>) -> Self {
        SchedulerError::Internal(msg.into())
    }
}

//! Scheduler configuration, assembled from the environment at startup.

use crate::error::{Result, SchedulerError};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub database_url: String,
    pub gateway_base_url: String,
    pub internal_api_key: String,
    /// Poll period; 30s between scans of due reminders/events by default.
    pub check_interval_secs: u64,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://voxrelay.db".to_string());
        let gateway_base_url =
            std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());

        let key_file =
            std::env::var("INTERNAL_API_KEY_FILE").unwrap_or_else(|_| "/shared/internal_api_key".to_string());
        let internal_api_key = std::fs::read_to_string(&key_file)
            .map(|s| s.trim().to_string())
            .map_err(|e| SchedulerError::internal(format!("failed to read internal API key from {key_file}: {e}")))?;

        let check_interval_secs = std::env::var("CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        Ok(Self {
            database_url,
            gateway_base_url,
            internal_api_key,
            check_interval_secs,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            gateway_base_url: "http://localhost:8080".to_string(),
            internal_api_key: "test-internal-key".to_string(),
            check_interval_secs: 30,
        }
    }
}

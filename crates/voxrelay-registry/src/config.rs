//! Registry configuration, assembled from the environment at startup.

use crate::error::{RegistryError, Result};

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub bind_addr: std::net::SocketAddr,
    pub internal_api_key: String,
    /// Poll each registered app's `/healthz` on this interval.
    pub health_check_interval_secs: u64,
    /// Consecutive failures before an app is marked unhealthy.
    pub unhealthy_threshold: u32,
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8083".to_string())
            .parse()
            .map_err(|e| RegistryError::internal(format!("invalid BIND_ADDR: {e}")))?;

        let key_file =
            std::env::var("INTERNAL_API_KEY_FILE").unwrap_or_else(|_| "/shared/internal_api_key".to_string());
        let internal_api_key = std::fs::read_to_string(&key_file)
            .map(|s| s.trim().to_string())
            .map_err(|e| RegistryError::internal(format!("failed to read internal API key from {key_file}: {e}")))?;

        let health_check_interval_secs = std::env::var("HEALTH_CHECK_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30);

        let unhealthy_threshold = std::env::var("UNHEALTHY_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        Ok(Self {
            bind_addr,
            internal_api_key,
            health_check_interval_secs,
            unhealthy_threshold,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "0.0.0.0:8083".parse().unwrap(),
            internal_api_key: "test-internal-key".to_string(),
            health_check_interval_secs: 30,
            unhealthy_threshold: 3,
        }
    }
}

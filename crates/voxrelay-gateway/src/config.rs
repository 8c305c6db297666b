//! Gateway configuration, assembled from the environment at startup.
//!
//! # Examples
//!
//! ```no_run
//! use voxrelay_gateway::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_env().expect("valid configuration");
//! println!("listening on {}", config.bind_addr);
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GatewayError, Result};

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_expiration_minutes: i64,
    pub internal_api_key: String,
    pub voice_bridge_base_url: String,
    pub telephony_base_url: String,
    /// Target agent for a `/ws/voice` session that hasn't been routed to a
    /// specific agent yet (no call registered, or no handler assigned).
    pub primary_agent_id: String,
    /// AMQP broker URL for a multi-instance deployment. `None` runs the
    /// in-process `LocalBroker` instead.
    pub amqp_url: Option<String>,
    /// Root directory signed audio paths are resolved against. Every signed
    /// `file` query param is joined under here and the join result is
    /// rejected unless it still resolves inside this directory.
    pub audio_base_dir: PathBuf,
    /// Retention for delivered pending notifications before the hourly sweep
    /// removes them. Default 7 days.
    pub pending_notification_retention: Duration,
    pub ringing_timeout: Duration,
    pub hold_timeout: Duration,
    pub max_call_duration: Duration,
    pub timeout_check_interval: Duration,
}

impl GatewayConfig {
    /// Builds configuration from environment variables, loading a `.env`
    /// file first if present (mirrors `session-core`'s use of `dotenvy`).
    ///
    /// The internal API key is read from `INTERNAL_API_KEY_FILE` (default
    /// `/shared/internal_api_key`); a missing file is a fatal startup error
    /// — it is never silently bypassed.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let bind_addr = std::env::var("GATEWAY_BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| GatewayError::internal(format!("invalid GATEWAY_BIND_ADDR: {e}")))?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://voxrelay_gateway.db".to_string());

        let jwt_secret = std::env::var("JWT_SECRET")
            .map_err(|_| GatewayError::internal("JWT_SECRET must be set"))?;

        let jwt_expiration_minutes = std::env::var("JWT_EXPIRATION_MINUTES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(60);

        let key_file = std::env::var("INTERNAL_API_KEY_FILE")
            .unwrap_or_else(|_| "/shared/internal_api_key".to_string());
        let internal_api_key = std::fs::read_to_string(PathBuf::from(&key_file))
            .map(|s| s.trim().to_string())
            .map_err(|e| {
                GatewayError::internal(format!(
                    "failed to read internal API key from {key_file}: {e} (this is a deployment error, not recoverable)"
                ))
            })?;

        let retention_days: u64 = std::env::var("PENDING_NOTIFICATION_RETENTION_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(7);

        let audio_base_dir =
            PathBuf::from(std::env::var("AUDIO_BASE_DIR").unwrap_or_else(|_| "/shared/audio_files".to_string()));

        let voice_bridge_base_url =
            std::env::var("VOICE_BRIDGE_BASE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string());
        let telephony_base_url =
            std::env::var("TELEPHONY_BASE_URL").unwrap_or_else(|_| "http://localhost:8082".to_string());

        let amqp_url = std::env::var("AMQP_URL").ok();

        let primary_agent_id = std::env::var("PRIMARY_AGENT_ID").unwrap_or_else(|_| "primary_agent".to_string());

        Ok(Self {
            bind_addr,
            database_url,
            jwt_secret,
            jwt_expiration_minutes,
            internal_api_key,
            voice_bridge_base_url,
            telephony_base_url,
            primary_agent_id,
            amqp_url,
            audio_base_dir,
            pending_notification_retention: Duration::from_secs(retention_days * 24 * 3600),
            ringing_timeout: Duration::from_secs(30),
            hold_timeout: Duration::from_secs(300),
            max_call_duration: Duration::from_secs(1800),
            timeout_check_interval: Duration::from_secs(5),
        })
    }

    /// Test-only constructor: same defaults, no environment or filesystem
    /// access, so unit tests don't need a `.env` or key file on disk.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-secret".to_string(),
            jwt_expiration_minutes: 60,
            internal_api_key: "test-internal-key".to_string(),
            voice_bridge_base_url: "http://localhost:8081".to_string(),
            telephony_base_url: "http://localhost:8082".to_string(),
            primary_agent_id: "primary_agent".to_string(),
            amqp_url: None,
            audio_base_dir: std::env::temp_dir().join("voxrelay_test_audio"),
            pending_notification_retention: Duration::from_secs(7 * 24 * 3600),
            ringing_timeout: Duration::from_secs(30),
            hold_timeout: Duration::from_secs(300),
            max_call_duration: Duration::from_secs(1800),
            timeout_check_interval: Duration::from_secs(5),
        }
    }
}

//! Telephony adapter configuration, assembled from the environment at startup.

use crate::error::{Result, TelephonyError};

#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    pub bind_addr: std::net::SocketAddr,
    pub database_url: String,
    pub gateway_base_url: String,
    pub voice_bridge_base_url: String,
    pub internal_api_key: String,
    /// Public base URL the carrier reaches this process at, echoed back
    /// into the `Stream`/webhook URLs handed to the carrier.
    pub webhook_base_url: String,
    pub carrier_auth_token: String,
    /// Every carrier call is routed to a single fixed agent queue; phone
    /// calls have no per-session agent selection the way web calls do.
    pub primary_agent_id: String,
    pub max_concurrent_calls: usize,
    /// Local-development escape hatch; must be off by default and never
    /// set in production.
    pub skip_signature_validation: bool,
}

impl TelephonyConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8082".to_string())
            .parse()
            .map_err(|e| TelephonyError::internal(format!("invalid BIND_ADDR: {e}")))?;

        let database_url =
            std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://voxrelay.db".to_string());
        let gateway_base_url =
            std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let voice_bridge_base_url =
            std::env::var("VOICE_BRIDGE_BASE_URL").unwrap_or_else(|_| "http://localhost:8081".to_string());

        let key_file =
            std::env::var("INTERNAL_API_KEY_FILE").unwrap_or_else(|_| "/shared/internal_api_key".to_string());
        let internal_api_key = std::fs::read_to_string(&key_file)
            .map(|s| s.trim().to_string())
            .map_err(|e| TelephonyError::internal(format!("failed to read internal API key from {key_file}: {e}")))?;

        let webhook_base_url =
            std::env::var("WEBHOOK_BASE_URL").unwrap_or_else(|_| "https://localhost".to_string());
        let carrier_auth_token = std::env::var("CARRIER_AUTH_TOKEN").unwrap_or_default();
        let primary_agent_id = std::env::var("PRIMARY_AGENT_ID").unwrap_or_else(|_| "primary_agent".to_string());

        let max_concurrent_calls = std::env::var("MAX_CONCURRENT_CALLS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(50);

        let skip_signature_validation = std::env::var("SKIP_SIGNATURE_VALIDATION")
            .map(|v| v == "true")
            .unwrap_or(false);

        Ok(Self {
            bind_addr,
            database_url,
            gateway_base_url,
            voice_bridge_base_url,
            internal_api_key,
            webhook_base_url,
            carrier_auth_token,
            primary_agent_id,
            max_concurrent_calls,
            skip_signature_validation,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "0.0.0.0:8082".parse().unwrap(),
            database_url: "sqlite::memory:".to_string(),
            gateway_base_url: "http://localhost:8080".to_string(),
            voice_bridge_base_url: "http://localhost:8081".to_string(),
            internal_api_key: "test-internal-key".to_string(),
            webhook_base_url: "https://example.test".to_string(),
            carrier_auth_token: "test-auth-token".to_string(),
            primary_agent_id: "primary_agent".to_string(),
            max_concurrent_calls: 50,
            skip_signature_validation: false,
        }
    }
}

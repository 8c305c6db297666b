//! Client for the telephony adapter's carrier-leg termination endpoint.
//! The gateway owns the Call state machine but never talks to the carrier
//! directly; ending a call with an attached carrier leg is an RPC to the
//! process that does, the same split `bridge_client.rs` uses for audio.

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

#[derive(Clone)]
pub struct TelephonyClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl TelephonyClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.telephony_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    /// Instructs the adapter to close the carrier media stream for
    /// `twilio_call_sid`, which is the only lever available without a real
    /// carrier REST client on this side of the split.
    pub async fn terminate_call(&self, twilio_call_sid: &str) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/telephony/internal/end-call", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({ "call_sid": twilio_call_sid }))
            .send()
            .await
            .map_err(|e| GatewayError::internal(format!("telephony adapter request failed: {e}")))?
            .error_for_status()
            .map_err(|e| GatewayError::internal(format!("telephony adapter rejected end-call: {e}")))?;
        Ok(())
    }
}

//! Client for the voice bridge's internal ingress — the gateway plays the
//! `call_audio` bus-queue producer role for web sessions, the same role
//! `voxrelay-telephony`'s own `bridge_client.rs` plays for carrier calls,
//! generalized to HTTP against the bridge's `server.rs`.

use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::error::{GatewayError, Result};

#[derive(Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl BridgeClient {
    pub fn new(config: &GatewayConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.voice_bridge_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    pub async fn stream_started(&self, session_id: &str, call_id: Uuid, primary_agent_id: &str) -> Result<()> {
        self.post(
            "/internal/stream-started",
            &serde_json::json!({
                "session_id": session_id,
                "call_id": call_id,
                "source": "web",
                "twilio_stream_sid": serde_json::Value::Null,
                "primary_agent_id": primary_agent_id,
            }),
        )
        .await
    }

    pub async fn call_audio(&self, session_id: &str, audio_base64: String) -> Result<()> {
        self.post(
            "/internal/call-audio",
            &serde_json::json!({ "session_id": session_id, "audio_base64": audio_base64 }),
        )
        .await
    }

    pub async fn call_ended(&self, session_id: &str) -> Result<()> {
        self.http
            .post(format!("{}/internal/call-ended/{session_id}", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .send()
            .await
            .map_err(|e| GatewayError::internal(format!("bridge request failed: {e}")))?
            .error_for_status()
            .map_err(|e| GatewayError::internal(format!("bridge rejected call_ended: {e}")))?;
        Ok(())
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        self.http
            .post(format!("{}{path}", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| GatewayError::internal(format!("bridge request failed: {e}")))?
            .error_for_status()
            .map_err(|e| GatewayError::internal(format!("bridge rejected request: {e}")))?;
        Ok(())
    }
}

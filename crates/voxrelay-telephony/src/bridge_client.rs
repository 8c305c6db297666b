//! Client for the voice bridge's internal ingress — this process plays the
//! `call_audio`/`voice_gateway` bus-queue producer role, generalized to HTTP
//! per [[voxrelay-voice-bridge]]'s own `server.rs`.

use uuid::Uuid;

use crate::config::TelephonyConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct BridgeClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl BridgeClient {
    pub fn new(config: &TelephonyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.voice_bridge_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    pub async fn stream_started(
        &self,
        session_id: &str,
        call_id: Uuid,
        twilio_stream_sid: &str,
        primary_agent_id: &str,
    ) -> Result<()> {
        self.post(
            "/internal/stream-started",
            &serde_json::json!({
                "session_id": session_id,
                "call_id": call_id,
                "source": "twilio",
                "twilio_stream_sid": twilio_stream_sid,
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
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn post(&self, path: &str, body: &serde_json::Value) -> Result<()> {
        self.http
            .post(format!("{}{path}", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(body)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

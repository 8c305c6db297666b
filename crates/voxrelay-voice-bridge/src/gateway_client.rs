//! Thin REST client for the gateway's internal endpoints. The bridge runs
//! as its own process and has no access to the gateway's in-process
//! broker, so every agent-queue publish and transcript write crosses this
//! HTTP boundary instead.

use uuid::Uuid;
use voxrelay_core::{AgentMessage, Notification};

use crate::config::BridgeConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl GatewayClient {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.gateway_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    pub async fn send_agent_message(&self, agent_id: &str, message: AgentMessage) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/agents/{agent_id}/message", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn publish_notification(&self, notification: &Notification) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/notifications", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Pushes synthesized web-egress audio to a session's live socket.
    pub async fn push_session_audio(&self, session_id: &str, audio: Vec<u8>) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/sessions/{session_id}/audio", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .body(audio)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_transcription(
        &self,
        call_id: Uuid,
        speaker_type: voxrelay_core::SpeakerType,
        speaker_id: Option<String>,
        content: String,
        audio_file_path: Option<String>,
        audio_duration_ms: Option<i64>,
        stt_confidence: Option<f32>,
    ) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/calls/internal/transcription", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({
                "call_id": call_id,
                "speaker_type": speaker_type,
                "speaker_id": speaker_id,
                "content": content,
                "audio_file_path": audio_file_path,
                "audio_duration_ms": audio_duration_ms,
                "stt_confidence": stt_confidence,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

//! Client for the telephony adapter's internal TTS-audio ingress (
//! "Telephony egress"). The bridge hands off mulaw-encoded audio; the
//! adapter owns pacing it onto the live carrier media WS.

use crate::config::BridgeConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct TelephonyClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl TelephonyClient {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.telephony_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    pub async fn send_tts_audio(&self, call_sid: &str, stream_sid: &str, audio_data_base64: String) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/telephony/internal/tts-audio", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({
                "call_sid": call_sid,
                "stream_sid": stream_sid,
                "audio_data": audio_data_base64,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

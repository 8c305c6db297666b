//! Text-to-speech provider abstraction: a primary streaming provider with
//! an HTTP-buffered fallback, a per-agent voice-id cache, and a circuit
//! breaker per provider.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

#[async_trait]
pub trait TtsProvider: Send + Sync {
    /// Synthesizes `text` in the given agent's voice, returning raw audio
    /// bytes (format-tagged by the provider; auto-detected downstream via
    /// `audio::detect_format`).
    async fn synthesize(&self, voice_id: &str, text: &str, emotion: Option<&str>) -> Result<Vec<u8>>;
}

/// HTTP-buffered TTS client: one request per utterance, whole audio body
/// returned in the response. Used directly by providers with no streaming
/// endpoint, and as [`FallbackTtsProvider`]'s fallback leg otherwise.
pub struct HttpTtsProvider {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl HttpTtsProvider {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.tts_provider_url.clone(),
            breaker: CircuitBreaker::new(),
        }
    }
}

#[async_trait]
impl TtsProvider for HttpTtsProvider {
    async fn synthesize(&self, voice_id: &str, text: &str, emotion: Option<&str>) -> Result<Vec<u8>> {
        if self.breaker.is_open() {
            return Err(BridgeError::TtsFailure("circuit breaker open".to_string()));
        }

        let result = self
            .http
            .post(format!("{}/synthesize", self.base_url))
            .json(&serde_json::json!({ "voice_id": voice_id, "text": text, "emotion": emotion }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(resp) => {
                let bytes = resp.bytes().await.map_err(|e| BridgeError::TtsFailure(e.to_string()))?;
                self.breaker.record_success();
                Ok(bytes.to_vec())
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(BridgeError::TtsFailure(e.to_string()))
            }
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Persistent WebSocket streaming TTS client, pre-warmed lazily on first
/// use and kept open across calls. One utterance is one request/response
/// round trip over the socket: a JSON request frame, then binary audio
/// chunks until a `{"done":true}` text frame closes the turn.
pub struct WsTtsProvider {
    ws_url: String,
    conn: AsyncMutex<Option<WsStream>>,
    breaker: CircuitBreaker,
}

impl WsTtsProvider {
    pub fn new(config: &BridgeConfig) -> Self {
        Self { ws_url: config.tts_stream_url.clone(), conn: AsyncMutex::new(None), breaker: CircuitBreaker::new() }
    }

    async fn synthesize_over_socket(&self, voice_id: &str, text: &str, emotion: Option<&str>) -> Result<Vec<u8>> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            let (stream, _) = tokio_tungstenite::connect_async(&self.ws_url)
                .await
                .map_err(|e| BridgeError::TtsFailure(format!("streaming tts connect failed: {e}")))?;
            *guard = Some(stream);
        }
        let stream = guard.as_mut().expect("connection established above");

        let request = serde_json::json!({ "voice_id": voice_id, "text": text, "emotion": emotion });
        stream
            .send(WsMessage::Text(request.to_string()))
            .await
            .map_err(|e| BridgeError::TtsFailure(format!("streaming tts send failed: {e}")))?;

        let mut audio = Vec::new();
        loop {
            let Some(msg) = stream.next().await else {
                return Err(BridgeError::TtsFailure("streaming tts connection closed mid-utterance".to_string()));
            };
            match msg.map_err(|e| BridgeError::TtsFailure(format!("streaming tts recv failed: {e}")))? {
                WsMessage::Binary(chunk) => audio.extend_from_slice(&chunk),
                WsMessage::Text(text) => {
                    let done = serde_json::from_str::<serde_json::Value>(&text)
                        .ok()
                        .and_then(|v| v.get("done").and_then(|d| d.as_bool()))
                        .unwrap_or(false);
                    if done {
                        break;
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }

        if audio.is_empty() {
            return Err(BridgeError::TtsFailure("streaming tts returned no audio".to_string()));
        }
        Ok(audio)
    }
}

#[async_trait]
impl TtsProvider for WsTtsProvider {
    async fn synthesize(&self, voice_id: &str, text: &str, emotion: Option<&str>) -> Result<Vec<u8>> {
        if self.breaker.is_open() {
            return Err(BridgeError::TtsFailure("circuit breaker open".to_string()));
        }

        match self.synthesize_over_socket(voice_id, text, emotion).await {
            Ok(audio) => {
                self.breaker.record_success();
                Ok(audio)
            }
            Err(err) => {
                self.breaker.record_failure();
                self.conn.lock().await.take();
                Err(err)
            }
        }
    }
}

/// Prefers the streaming provider, falling back to the HTTP-buffered one
/// on connect failure or a broken mid-utterance socket. This is the
/// provider the composition root wires up by default.
pub struct FallbackTtsProvider {
    streaming: WsTtsProvider,
    buffered: HttpTtsProvider,
}

impl FallbackTtsProvider {
    pub fn new(config: &BridgeConfig) -> Self {
        Self { streaming: WsTtsProvider::new(config), buffered: HttpTtsProvider::new(config) }
    }
}

#[async_trait]
impl TtsProvider for FallbackTtsProvider {
    async fn synthesize(&self, voice_id: &str, text: &str, emotion: Option<&str>) -> Result<Vec<u8>> {
        match self.streaming.synthesize(voice_id, text, emotion).await {
            Ok(audio) => Ok(audio),
            Err(err) => {
                warn!(error = %err, "streaming tts failed, falling back to buffered http tts");
                self.buffered.synthesize(voice_id, text, emotion).await
            }
        }
    }
}

/// Resolves and caches an agent's voice id: one HTTP lookup per agent per
/// process lifetime, cached at process scope since the voice id doesn't
/// change mid-process, which subsumes the narrower per-call case.
pub struct VoiceResolver {
    http: reqwest::Client,
    base_url: String,
    cache: SyncMutex<HashMap<String, String>>,
}

impl VoiceResolver {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.tts_provider_url.clone(),
            cache: SyncMutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, agent_id: &str) -> Result<String> {
        if let Some(voice_id) = self.cache.lock().get(agent_id).cloned() {
            return Ok(voice_id);
        }

        #[derive(serde::Deserialize)]
        struct VoiceLookup {
            voice_id: String,
        }

        let lookup: VoiceLookup = self
            .http
            .get(format!("{}/voices/{agent_id}", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(|e| BridgeError::TtsFailure(e.to_string()))?;

        self.cache.lock().insert(agent_id.to_string(), lookup.voice_id.clone());
        Ok(lookup.voice_id)
    }
}

/// Estimated duration of a TTS utterance for the audio-ducking window:
/// `max(2s, words/3 + 1s)`.
pub fn estimate_speech_duration(text: &str) -> std::time::Duration {
    let words = text.split_whitespace().count() as f64;
    let seconds = (words / 3.0 + 1.0).max(2.0);
    std::time::Duration::from_secs_f64(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_has_a_floor_of_two_seconds() {
        assert_eq!(estimate_speech_duration(""), std::time::Duration::from_secs(2));
    }

    #[test]
    fn duration_scales_with_word_count() {
        let text = "one two three four five six seven eight nine";
        let d = estimate_speech_duration(text);
        assert!(d > std::time::Duration::from_secs(2));
    }
}

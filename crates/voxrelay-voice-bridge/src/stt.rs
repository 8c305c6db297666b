//! Streaming speech-to-text provider abstraction.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::warn;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptEvent {
    pub speaker_id: Option<String>,
    pub text: String,
    pub is_final: bool,
    #[serde(default)]
    pub is_formatted: bool,
}

#[async_trait]
pub trait SttProvider: Send + Sync {
    /// Pushes one buffered PCM chunk (already at the provider's minimum
    /// size) and returns whatever transcript events it produced.
    async fn transcribe_chunk(&self, session_id: &str, pcm16_chunk: &[u8]) -> Result<Vec<TranscriptEvent>>;
}

/// HTTP-buffered STT client, guarded by a circuit breaker so a provider
/// outage doesn't retry-storm every chunk of every active call.
pub struct HttpSttProvider {
    http: reqwest::Client,
    base_url: String,
    breaker: CircuitBreaker,
}

impl HttpSttProvider {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.stt_provider_url.clone(),
            breaker: CircuitBreaker::new(),
        }
    }
}

#[async_trait]
impl SttProvider for HttpSttProvider {
    async fn transcribe_chunk(&self, session_id: &str, pcm16_chunk: &[u8]) -> Result<Vec<TranscriptEvent>> {
        if self.breaker.is_open() {
            return Err(BridgeError::SttFailure("circuit breaker open".to_string()));
        }

        let result = self
            .http
            .post(format!("{}/transcribe", self.base_url))
            .json(&serde_json::json!({
                "session_id": session_id,
                "audio_base64": BASE64.encode(pcm16_chunk),
                "sample_rate": crate::audio::BRIDGE_SAMPLE_RATE,
            }))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status);

        match result {
            Ok(resp) => {
                let events: Vec<TranscriptEvent> = resp
                    .json()
                    .await
                    .map_err(|e| BridgeError::SttFailure(e.to_string()))?;
                self.breaker.record_success();
                Ok(events)
            }
            Err(e) => {
                self.breaker.record_failure();
                Err(BridgeError::SttFailure(e.to_string()))
            }
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Persistent WebSocket streaming STT client: one socket per session,
/// established lazily on the session's first chunk and kept open across
/// subsequent chunks rather than reconnecting per HTTP request.
pub struct WsSttProvider {
    stream_url: String,
    sessions: DashMap<String, Mutex<Option<WsStream>>>,
    breaker: CircuitBreaker,
}

impl WsSttProvider {
    pub fn new(config: &BridgeConfig) -> Self {
        Self { stream_url: config.stt_stream_url.clone(), sessions: DashMap::new(), breaker: CircuitBreaker::new() }
    }

    async fn transcribe_over_socket(&self, session_id: &str, pcm16_chunk: &[u8]) -> Result<Vec<TranscriptEvent>> {
        let entry = self.sessions.entry(session_id.to_string()).or_insert_with(|| Mutex::new(None));
        let mut guard = entry.lock().await;
        if guard.is_none() {
            let (stream, _) = tokio_tungstenite::connect_async(&self.stream_url)
                .await
                .map_err(|e| BridgeError::SttFailure(format!("streaming stt connect failed: {e}")))?;
            *guard = Some(stream);
        }
        let stream = guard.as_mut().expect("connection established above");

        stream
            .send(WsMessage::Binary(pcm16_chunk.to_vec()))
            .await
            .map_err(|e| BridgeError::SttFailure(format!("streaming stt send failed: {e}")))?;

        // The provider emits zero or more transcript events per chunk
        // pushed, then goes quiet until the next chunk; a short drain
        // window collects whatever arrived without blocking the caller on
        // a socket that has nothing more to say right now.
        let mut events = Vec::new();
        while let Ok(Some(msg)) = tokio::time::timeout(std::time::Duration::from_millis(50), stream.next()).await {
            match msg.map_err(|e| BridgeError::SttFailure(format!("streaming stt recv failed: {e}")))? {
                WsMessage::Text(text) => {
                    if let Ok(event) = serde_json::from_str::<TranscriptEvent>(&text) {
                        events.push(event);
                    }
                }
                WsMessage::Close(_) => break,
                _ => {}
            }
        }
        Ok(events)
    }
}

#[async_trait]
impl SttProvider for WsSttProvider {
    async fn transcribe_chunk(&self, session_id: &str, pcm16_chunk: &[u8]) -> Result<Vec<TranscriptEvent>> {
        if self.breaker.is_open() {
            return Err(BridgeError::SttFailure("circuit breaker open".to_string()));
        }

        match self.transcribe_over_socket(session_id, pcm16_chunk).await {
            Ok(events) => {
                self.breaker.record_success();
                Ok(events)
            }
            Err(err) => {
                self.breaker.record_failure();
                self.sessions.remove(session_id);
                Err(err)
            }
        }
    }
}

/// Prefers the streaming provider, falling back to the HTTP-buffered one
/// for that chunk on connect failure or a broken socket. This is the
/// provider the composition root wires up by default.
pub struct FallbackSttProvider {
    streaming: WsSttProvider,
    buffered: HttpSttProvider,
}

impl FallbackSttProvider {
    pub fn new(config: &BridgeConfig) -> Self {
        Self { streaming: WsSttProvider::new(config), buffered: HttpSttProvider::new(config) }
    }
}

#[async_trait]
impl SttProvider for FallbackSttProvider {
    async fn transcribe_chunk(&self, session_id: &str, pcm16_chunk: &[u8]) -> Result<Vec<TranscriptEvent>> {
        match self.streaming.transcribe_chunk(session_id, pcm16_chunk).await {
            Ok(events) => Ok(events),
            Err(err) => {
                warn!(session_id, error = %err, "streaming stt failed, falling back to buffered http stt");
                self.buffered.transcribe_chunk(session_id, pcm16_chunk).await
            }
        }
    }
}

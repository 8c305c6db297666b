//! Bridge configuration, assembled from the environment at startup.

use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub bind_addr: std::net::SocketAddr,
    pub gateway_base_url: String,
    pub telephony_base_url: String,
    pub internal_api_key: String,
    pub stt_provider_url: String,
    pub tts_provider_url: String,
    /// Persistent WebSocket streaming endpoints, preferred over the
    /// buffered HTTP providers above; a connect or mid-utterance failure
    /// falls back to the HTTP path for that call.
    pub stt_stream_url: String,
    pub tts_stream_url: String,
    /// Minimum chunk size forwarded to STT (~100ms at 16kHz/16-bit mono).
    pub stt_chunk_threshold: usize,
    /// STT buffer cap before oldest bytes are dropped (~2s).
    pub stt_buffer_cap: usize,
    /// Debounce delay before flushing `pending_transcription` to the agent queue.
    pub debounce_delay: Duration,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();

        let bind_addr = std::env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8081".to_string())
            .parse()
            .map_err(|e| BridgeError::internal(format!("invalid BIND_ADDR: {e}")))?;

        let gateway_base_url =
            std::env::var("GATEWAY_BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
        let telephony_base_url =
            std::env::var("TELEPHONY_BASE_URL").unwrap_or_else(|_| "http://localhost:8082".to_string());

        let key_file = std::env::var("INTERNAL_API_KEY_FILE")
            .unwrap_or_else(|_| "/shared/internal_api_key".to_string());
        let internal_api_key = std::fs::read_to_string(&key_file)
            .map(|s| s.trim().to_string())
            .map_err(|e| BridgeError::internal(format!("failed to read internal API key from {key_file}: {e}")))?;

        let stt_provider_url =
            std::env::var("STT_PROVIDER_URL").unwrap_or_else(|_| "http://localhost:9001".to_string());
        let tts_provider_url =
            std::env::var("TTS_PROVIDER_URL").unwrap_or_else(|_| "http://localhost:9002".to_string());
        let stt_stream_url =
            std::env::var("STT_STREAM_URL").unwrap_or_else(|_| "ws://localhost:9001/stream".to_string());
        let tts_stream_url =
            std::env::var("TTS_STREAM_URL").unwrap_or_else(|_| "ws://localhost:9002/stream".to_string());

        Ok(Self {
            bind_addr,
            gateway_base_url,
            telephony_base_url,
            internal_api_key,
            stt_provider_url,
            tts_provider_url,
            stt_stream_url,
            tts_stream_url,
            stt_chunk_threshold: 3_200,
            stt_buffer_cap: 64_000,
            debounce_delay: Duration::from_millis(1_200),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "0.0.0.0:8081".parse().unwrap(),
            gateway_base_url: "http://localhost:8080".to_string(),
            telephony_base_url: "http://localhost:8082".to_string(),
            internal_api_key: "test-internal-key".to_string(),
            stt_provider_url: "http://localhost:9001".to_string(),
            tts_provider_url: "http://localhost:9002".to_string(),
            stt_stream_url: "ws://localhost:9001/stream".to_string(),
            tts_stream_url: "ws://localhost:9002/stream".to_string(),
            stt_chunk_threshold: 3_200,
            stt_buffer_cap: 64_000,
            debounce_delay: Duration::from_millis(1_200),
        }
    }
}

//! The bridge manager: one entry per live call-audio session,
//! coordinating STT buffering/debounce/ducking and TTS egress. Grounded on
//! `call-engine`'s "one engine struct holding concurrent per-call state"
//! shape, the same pattern `voxrelay-gateway`'s call manager follows.

mod session;

pub use session::{CallAudioSource, SessionState};

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxrelay_core::{AgentMessage, Notification, NotificationPayload, SpeakerType};

use crate::audio;
use crate::config::BridgeConfig;
use crate::error::Result;
use crate::gateway_client::GatewayClient;
use crate::stt::{SttProvider, TranscriptEvent};
use crate::telephony_client::TelephonyClient;
use crate::tts::{estimate_speech_duration, TtsProvider, VoiceResolver};

pub struct BridgeManager {
    config: BridgeConfig,
    sessions: DashMap<String, Mutex<SessionState>>,
    stt: Arc<dyn SttProvider>,
    tts: Arc<dyn TtsProvider>,
    voices: VoiceResolver,
    gateway: GatewayClient,
    telephony: TelephonyClient,
}

impl BridgeManager {
    pub fn new(
        config: BridgeConfig,
        stt: Arc<dyn SttProvider>,
        tts: Arc<dyn TtsProvider>,
    ) -> Arc<Self> {
        let gateway = GatewayClient::new(&config);
        let telephony = TelephonyClient::new(&config);
        let voices = VoiceResolver::new(&config);
        Arc::new(Self {
            config,
            sessions: DashMap::new(),
            stt,
            tts,
            voices,
            gateway,
            telephony,
        })
    }

    pub fn handle_stream_started(
        &self,
        session_id: String,
        call_id: Uuid,
        source: CallAudioSource,
        twilio_stream_sid: Option<String>,
        primary_agent_id: String,
    ) {
        info!(session_id = %session_id, call_id = %call_id, "bridge session started");
        let mut state = SessionState::new(session_id.clone(), call_id, source, primary_agent_id);
        state.twilio_stream_sid = twilio_stream_sid;
        self.sessions.insert(session_id, Mutex::new(state));
    }

    pub fn handle_call_ended(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            debug!(session_id, "bridge session ended");
        }
    }

    /// `call_audio`: base64 PCM 16kHz 16-bit mono chunk.
    pub async fn handle_call_audio(&self, session_id: &str, audio_base64: &str) -> Result<()> {
        let Some(entry) = self.sessions.get(session_id) else {
            return Ok(()); // session already ended; drop stragglers
        };
        let pcm = BASE64
            .decode(audio_base64)
            .map_err(|_| crate::error::BridgeError::UnsupportedFormat)?;

        let (ready_chunk, ducking, call_id, primary_agent_id) = {
            let mut state = entry.lock().await;
            let ready = state.push_audio(&pcm, self.config.stt_chunk_threshold, self.config.stt_buffer_cap);
            (ready, state.is_ducking(), state.call_id, state.primary_agent_id.clone())
        };

        let Some(chunk) = ready_chunk else {
            return Ok(());
        };

        if ducking {
            // Avoid feeding the agent's own voice back to itself.
            return Ok(());
        }

        let events = match self.stt.transcribe_chunk(session_id, &chunk).await {
            Ok(events) => events,
            Err(err) => {
                warn!(session_id, error = %err, "stt transcription failed");
                self.signal_voice_failure(&primary_agent_id, session_id, None).await;
                return Ok(());
            }
        };

        self.process_transcript_events(session_id, call_id, events).await
    }

    async fn process_transcript_events(
        &self,
        session_id: &str,
        call_id: Uuid,
        events: Vec<TranscriptEvent>,
    ) -> Result<()> {
        // Dedup: within one STT response batch, a formatted final
        // supersedes any unformatted final for the same turn.
        let has_formatted_final = events.iter().any(|e| e.is_final && e.is_formatted);

        let Some(entry) = self.sessions.get(session_id) else {
            return Ok(());
        };

        for event in events {
            if event.is_final && !event.is_formatted && has_formatted_final {
                continue;
            }

            let accepted = {
                let mut state = entry.lock().await;
                state.accepts_speaker(event.speaker_id.as_deref())
            };
            if !accepted {
                continue;
            }

            if !event.is_final {
                let notification = Notification::new(
                    "voice_bridge",
                    Some(session_id.to_string()),
                    NotificationPayload::NewMessage {
                        content: event.text,
                        role: "user_interim".to_string(),
                    },
                );
                let _ = self.gateway.publish_notification(&notification).await;
                continue;
            }

            entry.lock().await.append_pending(&event.text);
            let _ = self
                .gateway
                .record_transcription(call_id, SpeakerType::User, event.speaker_id, event.text, None, None, None)
                .await;
        }

        Ok(())
    }

    /// Background task: periodically flushes any session whose debounce
    /// window has elapsed.
    pub async fn run_debounce_loop(self: Arc<Self>) {
        let mut ticker = tokio::time::interval(Duration::from_millis(200));
        loop {
            ticker.tick().await;
            let session_ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
            for session_id in session_ids {
                self.flush_if_stale(&session_id).await;
            }
        }
    }

    async fn flush_if_stale(&self, session_id: &str) {
        let Some(entry) = self.sessions.get(session_id) else {
            return;
        };
        let (text, primary_agent_id, call_id) = {
            let mut state = entry.lock().await;
            let text = state.take_pending_if_stale(self.config.debounce_delay);
            (text, state.primary_agent_id.clone(), state.call_id)
        };
        let Some(text) = text else { return };

        info!(session_id, "flushing debounced transcription to agent queue");
        let message = AgentMessage::new(
            "call_transcription",
            serde_json::json!({ "content": text, "voice_metadata": { "is_call_mode": true } }),
        )
        .with_call(call_id, session_id);
        if let Err(err) = self.gateway.send_agent_message(&primary_agent_id, message).await {
            warn!(session_id, error = %err, "failed to dispatch debounced transcription");
        }
    }

    /// `voice_gateway` speak request.
    pub async fn handle_speak_request(
        &self,
        session_id: &str,
        agent_id: &str,
        content: &str,
        emotion: Option<&str>,
    ) -> Result<()> {
        let Some(entry) = self.sessions.get(session_id) else {
            return Err(crate::error::BridgeError::UnknownSession(session_id.to_string()));
        };
        let (source, twilio_stream_sid, call_id) = {
            let mut state = entry.lock().await;
            state.start_ducking(estimate_speech_duration(content));
            (state.source, state.twilio_stream_sid.clone(), state.call_id)
        };

        let voice_id = match self.voices.resolve(agent_id).await {
            Ok(v) => v,
            Err(_) => agent_id.to_string(),
        };

        let audio = match self.tts.synthesize(&voice_id, content, emotion).await {
            Ok(audio) => audio,
            Err(err) => {
                warn!(session_id, error = %err, "tts synthesis failed");
                self.signal_voice_failure(agent_id, session_id, Some(content)).await;
                return Err(err);
            }
        };

        match source {
            CallAudioSource::Web => {
                let pcm = self.decode_to_pcm(&audio)?;
                let wav = audio::pcm_to_wav(&pcm, audio::BRIDGE_SAMPLE_RATE);
                self.gateway.push_session_audio(session_id, wav).await?;
            }
            CallAudioSource::Twilio => {
                let pcm = self.decode_to_pcm(&audio)?;
                let mulaw = audio::pcm_to_mulaw(&pcm);
                let Some(stream_sid) = twilio_stream_sid else {
                    warn!(session_id, "twilio session missing stream_sid, dropping TTS audio");
                    return Ok(());
                };
                self.telephony
                    .send_tts_audio(&call_id.to_string(), &stream_sid, BASE64.encode(mulaw))
                    .await?;
            }
        }

        Ok(())
    }

    fn decode_to_pcm(&self, audio: &[u8]) -> Result<Vec<u8>> {
        match audio::detect_format(audio) {
            audio::DetectedFormat::Wav => audio::wav_to_pcm(audio),
            audio::DetectedFormat::Mp3 => audio::mp3_to_pcm(audio),
            audio::DetectedFormat::Unknown => Ok(audio.to_vec()),
        }
    }

    async fn signal_voice_failure(&self, agent_id: &str, session_id: &str, original_text: Option<&str>) {
        let call_id = match self.sessions.get(session_id) {
            Some(entry) => entry.lock().await.call_id,
            None => Uuid::nil(),
        };
        let message = AgentMessage::new(
            "voice_failure",
            serde_json::json!({
                "fallback_action": "use_text_mode",
                "original_text": original_text,
            }),
        )
        .with_call(call_id, session_id);
        let _ = self.gateway.send_agent_message(agent_id, message).await;
    }
}

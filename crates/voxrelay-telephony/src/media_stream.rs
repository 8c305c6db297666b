//! Carrier media-stream WebSocket handler: receives `connected`,
//! `start`, `media`, `mark`, `stop` events and bridges inbound audio to the
//! voice bridge. Grounded on `media_stream.py`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxrelay_core::{CallEndReason, CallSource};

use crate::audio;
use crate::state::{AppState, MediaStream};

pub async fn media_stream(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Buffer thresholds identical to the bridge's own STT buffer:
/// both sit on the same PCM stream, just on opposite sides of the bus.
const MAX_BUFFER_SIZE: usize = 64_000;
const CHUNK_THRESHOLD: usize = 3_200;

async fn handle_socket(socket: WebSocket, session_id: String, state: Arc<AppState>) {
    info!(session_id, "media stream socket accepted");
    let (sink, mut source) = socket.split();
    let mut sink = Some(sink);

    let mut call_id = Uuid::nil();
    let mut twilio_call_sid = String::new();
    let mut registered = false;
    let mut audio_buffer: Vec<u8> = Vec::new();

    while let Some(Ok(msg)) = source.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(data) = serde_json::from_str::<serde_json::Value>(&text) else { continue };
        let event = data.get("event").and_then(|v| v.as_str()).unwrap_or_default();

        match event {
            "connected" => info!(session_id, "carrier stream connected"),

            "start" => {
                let start = &data["start"];
                let stream_sid = start.get("streamSid").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let params = &start["customParameters"];
                call_id = params
                    .get("call_id")
                    .and_then(|v| v.as_str())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or_else(Uuid::new_v4);
                twilio_call_sid = params.get("twilio_call_sid").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                let caller_phone_number = params.get("caller_phone_number").and_then(|v| v.as_str()).map(str::to_string);
                let direction = params.get("direction").and_then(|v| v.as_str()).unwrap_or("inbound");

                info!(session_id, stream_sid = %stream_sid, %call_id, "carrier stream started");

                let Some(ws_sink) = sink.take() else {
                    warn!(session_id, "duplicate start event on media stream, ignoring");
                    continue;
                };
                state.streams.insert(
                    twilio_call_sid.clone(),
                    Arc::new(MediaStream {
                        session_id: session_id.clone(),
                        call_id,
                        stream_sid: stream_sid.clone(),
                        sink: Mutex::new(ws_sink),
                    }),
                );
                registered = true;
                state.call_started();

                if let Err(err) = state
                    .bridge
                    .stream_started(&session_id, call_id, &stream_sid, &state.config.primary_agent_id)
                    .await
                {
                    warn!(session_id, error = %err, "failed to publish stream_started");
                }

                if direction != "outbound" {
                    match state
                        .gateway
                        .register_phone_call(
                            call_id,
                            &session_id,
                            &state.config.primary_agent_id,
                            &twilio_call_sid,
                            caller_phone_number,
                            CallSource::TwilioInbound,
                        )
                        .await
                    {
                        Ok(call) => {
                            if let Err(err) = state.gateway.answer_call(call.call_id, "user").await {
                                warn!(session_id, error = %err, "failed to mark inbound call connected");
                            }
                        }
                        Err(err) => warn!(session_id, error = %err, "failed to register inbound phone call"),
                    }
                } else if let Err(err) = state.gateway.answer_call(call_id, "user").await {
                    warn!(session_id, error = %err, "failed to mark outbound call connected");
                }
            }

            "media" => {
                let Some(payload) = data["media"]["payload"].as_str() else { continue };
                let Ok(mulaw) = BASE64.decode(payload) else { continue };
                let pcm = audio::mulaw_to_pcm(&mulaw);
                audio_buffer.extend_from_slice(&pcm);
                if audio_buffer.len() > MAX_BUFFER_SIZE {
                    let excess = audio_buffer.len() - MAX_BUFFER_SIZE;
                    audio_buffer.drain(0..excess);
                }
                if audio_buffer.len() >= CHUNK_THRESHOLD {
                    let chunk = std::mem::take(&mut audio_buffer);
                    if let Err(err) = state.bridge.call_audio(&session_id, BASE64.encode(chunk)).await {
                        warn!(session_id, error = %err, "failed to forward call_audio to bridge");
                    }
                }
            }

            "mark" => debug!(session_id, "received mark event"),

            "stop" => {
                info!(session_id, "carrier stream stopped");
                break;
            }

            other => debug!(session_id, event = other, "unhandled carrier event"),
        }
    }

    if !audio_buffer.is_empty() {
        if let Err(err) = state.bridge.call_audio(&session_id, BASE64.encode(&audio_buffer)).await {
            warn!(session_id, error = %err, "failed to flush remaining audio buffer");
        }
    }

    if !twilio_call_sid.is_empty() {
        state.streams.remove(&twilio_call_sid);
    }
    if registered {
        state.call_finished();
    }
    if let Err(err) = state.bridge.call_ended(&session_id).await {
        warn!(session_id, error = %err, "failed to publish call_ended to bridge");
    }
    if call_id != Uuid::nil() {
        if let Err(err) = state.gateway.end_call(call_id, CallEndReason::Disconnected).await {
            debug!(session_id, error = %err, "call already ended or gateway unreachable on stream close");
        }
    }

    info!(session_id, "media stream cleanup complete");
}

//! WebSocket upgrade handlers.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;
use voxrelay_core::{AgentMessage, CallEndReason};

use crate::auth;
use crate::error::{GatewayError, Result};
use crate::server::AppState;

#[derive(Deserialize)]
pub struct WsTokenQuery {
    token: Option<String>,
}

/// `/ws/conversations/{session_id}/stream`: registers the socket in the
/// shared `WsRegistry`, sends a `{type:"connected"}` frame, replays any
/// pending notifications, then reads frames until the client disconnects.
/// Inbound `user_message` frames are forwarded to the session's current
/// agent; anything else is logged and dropped, matching the original's
/// `websocket_manager.py`.
pub async fn conversation_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<WsTokenQuery>,
) -> Response {
    let Some(token) = query.token else {
        return GatewayError::unauthorized("missing token query parameter").into_response();
    };
    if let Err(err) = auth::verify_voice_token(&state.config.jwt_secret, &token) {
        return err.into_response();
    }

    ws.on_upgrade(move |socket| handle_conversation_socket(socket, state, session_id))
}

async fn handle_conversation_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));
    let handle = state.ws_registry.connect(&session_id, sink.clone());

    let connected_frame = serde_json::json!({ "type": "connected" }).to_string();
    if sink.lock().await.send(Message::Text(connected_frame)).await.is_err() {
        warn!(session_id = %session_id, "failed to send connected frame, aborting socket");
        state.ws_registry.disconnect(&session_id, handle);
        return;
    }

    if let Err(err) = state.fabric.replay_pending(&session_id).await {
        warn!(session_id = %session_id, error = %err, "failed to replay pending notifications");
    }

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => forward_user_message(&state, &session_id, &text).await,
            Ok(Message::Close(_)) => break,
            Ok(other) => debug!(session_id = %session_id, ?other, "ignoring inbound client frame"),
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "websocket read error");
                break;
            }
        }
    }

    state.ws_registry.disconnect(&session_id, handle);
}

#[derive(Deserialize)]
struct UserMessageFrame {
    #[serde(rename = "type")]
    frame_type: String,
    content: String,
    #[serde(rename = "inputMode", default)]
    input_mode: Option<String>,
    #[serde(rename = "voiceMetadata", default)]
    voice_metadata: Option<serde_json::Value>,
}

/// Parses an inbound text frame as `{type:"user_message", content,
/// inputMode, voiceMetadata?}` and relays it to whichever agent currently
/// owns the session's call, falling back to the configured primary agent
/// when the session has no call yet (text-only chat before any call).
async fn forward_user_message(state: &Arc<AppState>, session_id: &str, text: &str) {
    let frame: UserMessageFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => {
            debug!(session_id, "ignoring malformed inbound frame");
            return;
        }
    };
    if frame.frame_type != "user_message" {
        debug!(session_id, frame_type = %frame.frame_type, "ignoring unrecognized frame type");
        return;
    }

    let target_agent = state
        .call_manager
        .get_call_by_session(session_id)
        .and_then(|call| call.current_agent_id.or(Some(call.initial_target)))
        .unwrap_or_else(|| state.config.primary_agent_id.clone());

    let mut message = AgentMessage::new(
        "user_message",
        serde_json::json!({
            "content": frame.content,
            "input_mode": frame.input_mode.unwrap_or_else(|| "text".to_string()),
            "voice_metadata": frame.voice_metadata,
        }),
    );
    message.session_id = Some(session_id.to_string());

    if let Err(err) = state.broker.publish_to_agent(&target_agent, message).await {
        warn!(session_id, agent_id = %target_agent, error = %err, "failed to forward user_message");
    }
}

#[derive(Deserialize)]
struct StartSessionPayload {
    platform: String,
    #[serde(default)]
    audio_format: Option<String>,
    #[serde(default)]
    user_timezone: Option<String>,
    #[serde(default)]
    endpointing_ms: Option<u64>,
    #[serde(default)]
    tts_provider: Option<String>,
    #[serde(default)]
    tts_voice_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum VoiceControlFrame {
    #[serde(rename = "start_session")]
    StartSession { payload: StartSessionPayload },
    #[serde(other)]
    Other,
}

const MAX_BUFFER_SIZE: usize = 64_000;
const CHUNK_THRESHOLD: usize = 3_200;

/// `/ws/voice/{session_id}?token=<voice JWT>`: the web counterpart to the
/// telephony adapter's `media_stream.rs`. First client frame must be
/// `start_session`; an invalid token closes the socket immediately with a
/// policy-violation close frame rather than silently dropping the
/// connection. TTS egress reaches this socket "for free" once
/// `stream_started` is published, through `WsRegistry::send_binary_to_session`
/// — the same mechanism the web push endpoint already uses.
pub async fn voice_stream(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(query): Query<WsTokenQuery>,
) -> Response {
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state, session_id, query.token))
}

async fn handle_voice_socket(socket: WebSocket, state: Arc<AppState>, session_id: String, token: Option<String>) {
    let (sink, mut stream) = socket.split();
    let sink = Arc::new(Mutex::new(sink));

    let token_valid = token
        .as_deref()
        .map(|t| auth::verify_voice_token(&state.config.jwt_secret, t).is_ok())
        .unwrap_or(false);

    if !token_valid {
        warn!(session_id, "rejecting voice stream: missing or invalid token");
        let close = CloseFrame { code: axum::extract::ws::close_code::POLICY, reason: "invalid voice token".into() };
        let _ = sink.lock().await.send(Message::Close(Some(close))).await;
        return;
    }

    info!(session_id, "voice stream socket accepted");

    let mut call_id: Option<Uuid> = None;
    let mut registered = false;
    let mut audio_buffer: Vec<u8> = Vec::new();

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let frame: VoiceControlFrame = match serde_json::from_str(&text) {
                    Ok(f) => f,
                    Err(_) => {
                        debug!(session_id, "ignoring malformed voice control frame");
                        continue;
                    }
                };
                match frame {
                    VoiceControlFrame::StartSession { payload } => {
                        if registered {
                            debug!(session_id, "duplicate start_session, ignoring");
                            continue;
                        }
                        match start_voice_session(&state, &session_id, &payload).await {
                            Ok(id) => {
                                call_id = Some(id);
                                registered = true;
                                state.ws_registry.connect(&session_id, sink.clone());
                            }
                            Err(err) => {
                                warn!(session_id, error = %err, "failed to start voice session");
                                break;
                            }
                        }
                    }
                    VoiceControlFrame::Other => debug!(session_id, "ignoring unrecognized voice control frame"),
                }
            }
            Message::Binary(chunk) => {
                if !registered {
                    debug!(session_id, "dropping audio received before start_session");
                    continue;
                }
                audio_buffer.extend_from_slice(&chunk);
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
            Message::Close(_) => break,
            _ => {}
        }
    }

    if registered {
        if !audio_buffer.is_empty() {
            if let Err(err) = state.bridge.call_audio(&session_id, BASE64.encode(&audio_buffer)).await {
                warn!(session_id, error = %err, "failed to flush remaining audio buffer");
            }
        }
        if let Err(err) = state.bridge.call_ended(&session_id).await {
            warn!(session_id, error = %err, "failed to publish call_ended to bridge");
        }
        if let Some(id) = call_id {
            if let Err(err) = state.call_manager.end_call(id, "user", Some(CallEndReason::Disconnected)).await {
                debug!(session_id, error = %err, "call already ended on voice stream close");
            }
        }
    }

    info!(session_id, "voice stream cleanup complete");
}

/// Resolves or creates the `Call` backing this session, answers it, and
/// announces the stream to the bridge. Mirrors `media_stream.rs`'s `start`
/// handling for the carrier leg. `audio_format`/`user_timezone`/
/// `endpointing_ms`/`tts_provider`/`tts_voice_id` describe the bridge's
/// in-memory `VoiceSession`, not the gateway's `Call` row, so they are
/// logged here and carried to the bridge as part of `stream_started` once
/// the bridge's session record grows those fields; today the bridge seeds
/// them from its own config defaults.
async fn start_voice_session(state: &Arc<AppState>, session_id: &str, payload: &StartSessionPayload) -> Result<Uuid> {
    debug!(
        session_id,
        platform = %payload.platform,
        audio_format = ?payload.audio_format,
        user_timezone = ?payload.user_timezone,
        endpointing_ms = ?payload.endpointing_ms,
        tts_provider = ?payload.tts_provider,
        tts_voice_id = ?payload.tts_voice_id,
        "starting voice session"
    );

    let primary_agent_id = state.config.primary_agent_id.clone();

    let call = match state.call_manager.get_call_by_session(session_id) {
        Some(call) => call,
        None => state.call_manager.initiate_call(session_id, "user", &primary_agent_id, false).await?,
    };

    let call = state.call_manager.answer_call(call.call_id, "user").await?;

    state.bridge.stream_started(session_id, call.call_id, &primary_agent_id).await?;

    Ok(call.call_id)
}

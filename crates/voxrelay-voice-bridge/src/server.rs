//! HTTP ingress standing in for the `call_audio`/`voice_gateway` bus
//! queues: in an AMQP deployment these would arrive as queue messages;
//! here the telephony adapter and gateway call this process's own
//! internal API directly, matching the rest of this workspace's
//! "LocalBroker now, AMQP later" pattern for a single-instance deployment.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::require_internal_key;
use crate::bridge::{BridgeManager, CallAudioSource};
use crate::error::Result;

pub struct AppState {
    pub bridge: Arc<BridgeManager>,
    pub internal_api_key: String,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", axum::routing::get(|| async { "ok" }))
        .route("/internal/stream-started", post(stream_started))
        .route("/internal/call-audio", post(call_audio))
        .route("/internal/call-ended/:session_id", post(call_ended))
        .route("/internal/speak", post(speak))
        .with_state(state)
}

#[derive(Deserialize)]
struct StreamStartedRequest {
    session_id: String,
    call_id: Uuid,
    source: String,
    twilio_stream_sid: Option<String>,
    primary_agent_id: String,
}

async fn stream_started(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<StreamStartedRequest>,
) -> Result<()> {
    require_internal_key(&state.internal_api_key, &headers)?;
    let source = if req.source == "twilio" {
        CallAudioSource::Twilio
    } else {
        CallAudioSource::Web
    };
    state
        .bridge
        .handle_stream_started(req.session_id, req.call_id, source, req.twilio_stream_sid, req.primary_agent_id);
    Ok(())
}

#[derive(Deserialize)]
struct CallAudioRequest {
    session_id: String,
    audio_base64: String,
}

async fn call_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CallAudioRequest>,
) -> Result<()> {
    require_internal_key(&state.internal_api_key, &headers)?;
    state.bridge.handle_call_audio(&req.session_id, &req.audio_base64).await
}

async fn call_ended(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
) -> Result<()> {
    require_internal_key(&state.internal_api_key, &headers)?;
    state.bridge.handle_call_ended(&session_id);
    Ok(())
}

#[derive(Deserialize)]
struct SpeakRequest {
    session_id: String,
    agent_id: String,
    content: String,
    emotion: Option<String>,
}

async fn speak(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(req): Json<SpeakRequest>) -> Result<()> {
    require_internal_key(&state.internal_api_key, &headers)?;
    state
        .bridge
        .handle_speak_request(&req.session_id, &req.agent_id, &req.content, req.emotion.as_deref())
        .await
}

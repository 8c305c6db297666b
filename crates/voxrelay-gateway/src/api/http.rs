//! REST surface. Each handler is a thin adapter over the call manager,
//! the notification fabric, or a `db` repository — business logic lives
//! there, not in the handler.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use voxrelay_core::{
    AgentMessage, Call, CallEndReason, CallTranscript, ConversationMessage, Notification, NotificationPayload,
    SpeakerType,
};

use crate::auth;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::server::AppState;

pub async fn healthz() -> &'static str {
    "ok"
}

fn require_internal_key(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| GatewayError::unauthorized("missing x-internal-api-key header"))?;
    if auth::verify_internal_api_key(&state.config.internal_api_key, presented) {
        Ok(())
    } else {
        Err(GatewayError::unauthorized("invalid internal API key"))
    }
}

#[derive(Deserialize)]
pub struct MintTokenRequest {
    pub session_id: String,
    pub user_id: Option<String>,
}

#[derive(Serialize)]
pub struct MintTokenResponse {
    pub token: String,
}

pub async fn mint_voice_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MintTokenRequest>,
) -> Result<Json<MintTokenResponse>> {
    let token = auth::mint_voice_token(
        &state.config.jwt_secret,
        &req.session_id,
        req.user_id.as_deref(),
        state.config.jwt_expiration_minutes,
    )?;
    Ok(Json(MintTokenResponse { token }))
}

#[derive(Deserialize)]
pub struct InitiateCallRequest {
    pub session_id: String,
    pub initiated_by: String,
    pub target_agent: String,
    #[serde(default)]
    pub fast_mode: bool,
}

pub async fn initiate_call(
    State(state): State<Arc<AppState>>,
    Json(req): Json<InitiateCallRequest>,
) -> Result<Json<Call>> {
    let call = state
        .call_manager
        .initiate_call(&req.session_id, &req.initiated_by, &req.target_agent, req.fast_mode)
        .await?;
    Ok(Json(call))
}

pub async fn list_active_calls(State(state): State<Arc<AppState>>) -> Json<Vec<Call>> {
    Json(state.call_manager.list_active_calls())
}

pub async fn get_call(State(state): State<Arc<AppState>>, Path(call_id): Path<Uuid>) -> Result<Json<Call>> {
    state
        .call_manager
        .get_call(call_id)
        .map(Json)
        .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))
}

pub async fn get_call_by_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Call>> {
    state
        .call_manager
        .get_call_by_session(&session_id)
        .map(Json)
        .ok_or_else(|| GatewayError::not_found(format!("no active call for session {session_id}")))
}

#[derive(Deserialize)]
pub struct AnswerRequest {
    pub answered_by: String,
}

pub async fn answer_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<AnswerRequest>,
) -> Result<Json<Call>> {
    Ok(Json(state.call_manager.answer_call(call_id, &req.answered_by).await?))
}

#[derive(Deserialize)]
pub struct DeclineRequest {
    pub declined_by: String,
    pub reason: Option<String>,
}

pub async fn decline_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<DeclineRequest>,
) -> Result<Json<Call>> {
    Ok(Json(
        state.call_manager.decline_call(call_id, &req.declined_by, req.reason).await?,
    ))
}

#[derive(Deserialize)]
pub struct EndCallRequest {
    pub ended_by: String,
    pub reason: Option<CallEndReason>,
}

pub async fn end_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<EndCallRequest>,
) -> Result<Json<Call>> {
    Ok(Json(state.call_manager.end_call(call_id, &req.ended_by, req.reason).await?))
}

#[derive(Deserialize)]
pub struct HoldRequest {
    pub reason: String,
}

pub async fn hold_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<HoldRequest>,
) -> Result<Json<Call>> {
    Ok(Json(state.call_manager.hold_call(call_id, &req.reason).await?))
}

pub async fn resume_call(State(state): State<Arc<AppState>>, Path(call_id): Path<Uuid>) -> Result<Json<Call>> {
    Ok(Json(state.call_manager.resume_call(call_id).await?))
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub from_agent: String,
    pub to_agent: String,
    pub announcement: Option<String>,
}

pub async fn transfer_call(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<TransferRequest>,
) -> Result<Json<Call>> {
    Ok(Json(
        state
            .call_manager
            .transfer_call(call_id, &req.from_agent, &req.to_agent, req.announcement)
            .await?,
    ))
}

#[derive(Deserialize)]
pub struct RecallRequest {
    pub by_agent: String,
}

pub async fn recall_phone(
    State(state): State<Arc<AppState>>,
    Path(call_id): Path<Uuid>,
    Json(req): Json<RecallRequest>,
) -> Result<Json<Call>> {
    Ok(Json(state.call_manager.recall_phone(call_id, &req.by_agent).await?))
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

pub async fn conversation_history(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Vec<ConversationMessage>>> {
    let rows = db::conversation::history(&state.pool, &session_id, q.limit.unwrap_or(100)).await?;
    Ok(Json(rows))
}

#[derive(Deserialize)]
pub struct AppendMessageRequest {
    pub role: SpeakerType,
    pub content: String,
    #[serde(default = "default_input_mode")]
    pub input_mode: String,
}

fn default_input_mode() -> String {
    "text".to_string()
}

pub async fn append_conversation_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<AppendMessageRequest>,
) -> Result<Json<ConversationMessage>> {
    let msg = ConversationMessage {
        id: Uuid::new_v4(),
        session_id,
        role: req.role,
        content: req.content,
        input_mode: req.input_mode,
        created_at: chrono::Utc::now(),
    };
    db::conversation::insert(&state.pool, &msg).await?;
    Ok(Json(msg))
}

pub async fn publish_notification(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<Notification>,
) -> Result<()> {
    if notification.is_broadcast() {
        state.broker.publish_fanout(&notification).await?;
    }
    state.fabric.route(&notification).await
}

#[derive(Deserialize)]
pub struct ActionStatusRequest {
    pub session_id: Option<String>,
    pub agent_id: String,
    pub action: String,
    pub status: String,
    pub detail: Option<serde_json::Value>,
}

pub async fn agent_action_status(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ActionStatusRequest>,
) -> Result<()> {
    let notification = Notification::new(
        "agent",
        req.session_id,
        NotificationPayload::AgentActionStatus {
            agent_id: req.agent_id,
            action: req.action,
            status: req.status,
            detail: req.detail,
        },
    );
    state.fabric.route(&notification).await
}

#[derive(Deserialize)]
pub struct AppInteractionRequest {
    pub session_id: Option<String>,
    pub app_id: String,
    pub interaction: String,
    pub detail: Option<serde_json::Value>,
}

pub async fn app_interaction(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AppInteractionRequest>,
) -> Result<()> {
    let notification = Notification::new(
        "app",
        req.session_id,
        NotificationPayload::AppInteraction {
            app_id: req.app_id,
            interaction: req.interaction,
            detail: req.detail,
        },
    );
    state.fabric.route(&notification).await
}

#[derive(Deserialize)]
pub struct RegisterPhoneCallRequest {
    pub call_id: Uuid,
    pub session_id: String,
    pub target_agent: String,
    pub carrier_call_sid: String,
    pub caller_phone_number: Option<String>,
    pub call_source: voxrelay_core::CallSource,
}

/// Internal endpoint: the telephony adapter registers a carrier-originated
/// Call here once its media stream has started, so hang-up,
/// transfer, and every other call-management operation work the same way
/// for a phone call as for a web call.
pub async fn register_phone_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterPhoneCallRequest>,
) -> Result<Json<Call>> {
    require_internal_key(&state, &headers)?;
    let call = state
        .call_manager
        .register_phone_call(
            req.call_id,
            &req.session_id,
            &req.target_agent,
            &req.carrier_call_sid,
            req.caller_phone_number,
            req.call_source,
        )
        .await?;
    Ok(Json(call))
}

#[derive(Deserialize)]
pub struct TranscriptionRequest {
    pub call_id: Uuid,
    pub speaker_type: SpeakerType,
    pub speaker_id: Option<String>,
    pub content: String,
    pub audio_file_path: Option<String>,
    pub audio_duration_ms: Option<i64>,
    pub stt_confidence: Option<f32>,
}

/// Internal endpoint: other processes (voice bridge, telephony adapter,
/// scheduler) that don't share this instance's in-process broker publish an
/// agent-queue message through here instead.
/// Internal endpoint: the voice bridge pushes synthesized web-egress audio
/// here as a raw body; the gateway relays it as a binary WS frame to
/// whichever browser session is listening.
pub async fn push_session_audio(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Result<()> {
    require_internal_key(&state, &headers)?;
    state.ws_registry.send_binary_to_session(&session_id, body.to_vec()).await;
    Ok(())
}

pub async fn send_agent_message(
    State(state): State<Arc<AppState>>,
    Path(agent_id): Path<String>,
    headers: HeaderMap,
    Json(message): Json<AgentMessage>,
) -> Result<()> {
    require_internal_key(&state, &headers)?;
    state.broker.publish_to_agent(&agent_id, message).await
}

/// Internal endpoint: the voice bridge and telephony adapter report each
/// utterance here, authenticated with the shared internal API key rather
/// than a user-facing credential.
pub async fn record_transcription(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TranscriptionRequest>,
) -> Result<()> {
    require_internal_key(&state, &headers)?;
    db::transcripts::insert(
        &state.pool,
        &CallTranscript {
            call_id: req.call_id,
            speaker_type: req.speaker_type,
            speaker_id: req.speaker_id,
            content: req.content,
            audio_file_path: req.audio_file_path,
            audio_duration_ms: req.audio_duration_ms,
            stt_confidence: req.stt_confidence,
            ts: chrono::Utc::now(),
        },
    )
    .await
}

#[derive(Deserialize)]
pub struct SignedAudioQuery {
    pub file: String,
    pub expires: i64,
}

fn guess_audio_content_type(file_path: &str) -> &'static str {
    match std::path::Path::new(file_path).extension().and_then(|e| e.to_str()) {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("m4a") => "audio/mp4",
        _ => "application/octet-stream",
    }
}

/// Serves a file under the configured audio base directory once its
/// signature and expiry have passed. `file` is rejected outright if it
/// contains a `..` or absolute component, before the HMAC check ever runs.
pub async fn serve_signed_audio(
    State(state): State<Arc<AppState>>,
    Path(sig): Path<String>,
    Query(query): Query<SignedAudioQuery>,
) -> Result<impl IntoResponse> {
    use std::path::Component;

    if std::path::Path::new(&query.file)
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(GatewayError::unauthorized("invalid audio file path"));
    }

    auth::verify_audio_signature(&state.config.jwt_secret, &query.file, query.expires, &sig)?;

    let full_path = state.config.audio_base_dir.join(&query.file);
    let bytes = tokio::fs::read(&full_path)
        .await
        .map_err(|_| GatewayError::not_found(format!("audio file not found: {}", query.file)))?;

    let content_type = guess_audio_content_type(&query.file);
    Ok(([(header::CONTENT_TYPE, content_type)], bytes))
}

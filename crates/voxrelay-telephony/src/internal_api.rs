//! Internal-API-key-gated endpoints: the voice bridge's TTS-audio ingress
//! (outbound leg), call origination, and DTMF playback. These are the
//! telephony adapter's own internal surface, the mirror image of
//! `voxrelay-voice-bridge`'s `server.rs`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::SinkExt;
use axum::extract::ws::Message;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use voxrelay_core::CallSource;

use crate::auth::verify_internal_api_key;
use crate::dtmf::validate_dtmf;
use crate::error::{Result, TelephonyError};
use crate::state::AppState;

/// Carrier media frames are 160 bytes of 8kHz mulaw (20ms); the bridge hands
/// us whole utterances, so we re-chunk and pace them out here.
const FRAME_BYTES: usize = 160;
const FRAME_INTERVAL: Duration = Duration::from_millis(18);

#[derive(Deserialize)]
pub struct TtsAudioRequest {
    call_sid: String,
    audio_base64: String,
}

pub async fn tts_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<TtsAudioRequest>,
) -> Result<&'static str> {
    verify_internal_api_key(&state.config.internal_api_key, &headers)?;

    let stream = state
        .streams
        .get(&req.call_sid)
        .map(|s| Arc::clone(&s))
        .ok_or_else(|| TelephonyError::UnknownStream(req.call_sid.clone()))?;

    let audio = BASE64
        .decode(&req.audio_base64)
        .map_err(|e| TelephonyError::invalid(format!("invalid base64 audio: {e}")))?;

    let mut sink = stream.sink.lock().await;
    for chunk in audio.chunks(FRAME_BYTES) {
        let frame = serde_json::json!({
            "event": "media",
            "streamSid": stream.stream_sid,
            "media": { "payload": BASE64.encode(chunk) },
        });
        if let Err(err) = sink.send(Message::Text(frame.to_string())).await {
            warn!(call_sid = %req.call_sid, error = %err, "failed to write media frame to carrier");
            return Err(TelephonyError::internal("carrier socket write failed"));
        }
        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    let mark = serde_json::json!({
        "event": "mark",
        "streamSid": stream.stream_sid,
        "mark": { "name": "tts-complete" },
    });
    let _ = sink.send(Message::Text(mark.to_string())).await;

    Ok("sent")
}

#[derive(Deserialize)]
pub struct OutboundCallRequest {
    to_phone_number: String,
    target_agent: String,
    session_id: Option<String>,
}

pub async fn originate_outbound_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<OutboundCallRequest>,
) -> Result<Json<serde_json::Value>> {
    verify_internal_api_key(&state.config.internal_api_key, &headers)?;

    if state.at_capacity() {
        return Err(TelephonyError::CarrierRejected("max concurrent calls reached".to_string()));
    }

    let session_id = req.session_id.unwrap_or_else(|| format!("twilio_out_{}", Uuid::new_v4()));
    let call_id = Uuid::new_v4();

    // Actual carrier call creation (a POST to the carrier's Calls API) is
    // out of scope here without live carrier credentials; we register the
    // call immediately and let the carrier's answer webhook attach the real
    // stream once it calls back to `/voice/outbound`.
    let call = state
        .gateway
        .register_phone_call(
            call_id,
            &session_id,
            &req.target_agent,
            &session_id,
            Some(req.to_phone_number.clone()),
            CallSource::TwilioOutbound,
        )
        .await?;

    info!(session_id = %session_id, call_id = %call.call_id, to = %req.to_phone_number, "outbound call originated");

    Ok(Json(serde_json::json!({
        "session_id": session_id,
        "call_id": call.call_id,
    })))
}

#[derive(Deserialize)]
pub struct EndCallRequest {
    call_sid: String,
}

/// Closes the carrier media-stream socket for `call_sid`. A real carrier
/// integration would instead call the carrier's REST API to hang up the
/// leg; closing our side of the media WS is the equivalent signal without
/// live carrier credentials, and the carrier drops the stream in response.
pub async fn end_call(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<EndCallRequest>,
) -> Result<&'static str> {
    verify_internal_api_key(&state.config.internal_api_key, &headers)?;

    let Some((_, stream)) = state.streams.remove(&req.call_sid) else {
        return Ok("already gone");
    };

    let mut sink = stream.sink.lock().await;
    let _ = sink.send(Message::Close(None)).await;

    info!(call_sid = %req.call_sid, "closed carrier media stream for call termination");
    Ok("closed")
}

#[derive(Deserialize)]
pub struct SendDtmfRequest {
    call_sid: String,
    digits: String,
}

pub async fn send_dtmf(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<SendDtmfRequest>,
) -> Result<&'static str> {
    verify_internal_api_key(&state.config.internal_api_key, &headers)?;
    validate_dtmf(&req.digits)?;

    let stream = state
        .streams
        .get(&req.call_sid)
        .map(|s| Arc::clone(&s))
        .ok_or_else(|| TelephonyError::UnknownStream(req.call_sid.clone()))?;

    let frame = serde_json::json!({
        "event": "dtmf",
        "streamSid": stream.stream_sid,
        "dtmf": { "digits": req.digits },
    });
    let mut sink = stream.sink.lock().await;
    sink.send(Message::Text(frame.to_string()))
        .await
        .map_err(|_| TelephonyError::internal("carrier socket write failed"))?;

    Ok("sent")
}

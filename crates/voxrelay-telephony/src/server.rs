//! Router composition for the telephony adapter process.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::internal_api::{end_call, originate_outbound_call, send_dtmf, tts_audio};
use crate::media_stream::media_stream;
use crate::state::AppState;
use crate::webhooks::{incoming_sms, incoming_voice, outbound_answer, status_callback};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/voice/incoming", post(incoming_voice))
        .route("/voice/outbound", post(outbound_answer))
        .route("/voice/status", post(status_callback))
        .route("/sms/incoming", post(incoming_sms))
        .route("/media-stream/:session_id", get(media_stream))
        .route("/api/v1/telephony/internal/tts-audio", post(tts_audio))
        .route("/api/v1/telephony/internal/dtmf", post(send_dtmf))
        .route("/api/v1/telephony/internal/end-call", post(end_call))
        .route("/api/v1/telephony/outbound", post(originate_outbound_call))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

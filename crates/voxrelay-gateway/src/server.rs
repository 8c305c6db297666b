//! Axum router composition and shared application state, mirroring
//! `call-engine`'s `api` module: one `AppState` struct threaded through
//! `State<Arc<AppState>>` extractors, one router-building function per
//! concern, merged in `build_router`.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use sqlx::sqlite::SqlitePool;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api::{http, ws};
use crate::bridge_client::BridgeClient;
use crate::broker::NotificationBroker;
use crate::config::GatewayConfig;
use crate::fabric::NotificationFabric;
use crate::orchestrator::CallManager;
use crate::ws_registry::WsRegistry;

pub struct AppState {
    pub call_manager: Arc<CallManager>,
    pub fabric: Arc<NotificationFabric>,
    pub broker: Arc<dyn NotificationBroker>,
    pub ws_registry: Arc<WsRegistry>,
    pub bridge: BridgeClient,
    pub pool: SqlitePool,
    pub config: GatewayConfig,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(http::healthz))
        .route("/voice/token", post(http::mint_voice_token))
        .route("/api/v1/calls", post(http::initiate_call).get(http::list_active_calls))
        .route("/api/v1/calls/:call_id", get(http::get_call))
        .route("/api/v1/calls/:call_id/answer", post(http::answer_call))
        .route("/api/v1/calls/:call_id/decline", post(http::decline_call))
        .route("/api/v1/calls/:call_id/end", post(http::end_call))
        .route("/api/v1/calls/:call_id/hold", post(http::hold_call))
        .route("/api/v1/calls/:call_id/resume", post(http::resume_call))
        .route("/api/v1/calls/:call_id/transfer", post(http::transfer_call))
        .route("/api/v1/calls/:call_id/recall", post(http::recall_phone))
        .route("/api/v1/sessions/:session_id/call", get(http::get_call_by_session))
        .route(
            "/api/v1/sessions/:session_id/history",
            get(http::conversation_history).post(http::append_conversation_message),
        )
        .route("/api/v1/notifications", post(http::publish_notification))
        .route(
            "/api/v1/notifications/action-status",
            post(http::agent_action_status),
        )
        .route("/api/v1/notifications/app-interaction", post(http::app_interaction))
        .route("/api/v1/calls/internal/transcription", post(http::record_transcription))
        .route("/api/v1/calls/internal/register-phone-call", post(http::register_phone_call))
        .route("/api/v1/agents/:agent_id/message", post(http::send_agent_message))
        .route("/api/v1/sessions/:session_id/audio", post(http::push_session_audio))
        .route("/audio/signed/:sig", get(http::serve_signed_audio))
        .route("/ws/conversations/:session_id/stream", get(ws::conversation_stream))
        .route("/ws/voice/:session_id", get(ws::voice_stream))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

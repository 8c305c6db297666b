//! Router composition and HTTP handlers for the registry process.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use subtle::ConstantTimeEq;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use voxrelay_core::RegisteredApp;

use crate::error::{RegistryError, Result};
use crate::registry::Registry;

pub struct AppState {
    pub registry: Arc<Registry>,
    pub internal_api_key: String,
}

fn require_internal_key(configured: &str, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| RegistryError::unauthorized("missing x-internal-api-key header"))?;
    if configured.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(RegistryError::unauthorized("invalid internal API key"))
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route("/api/v1/apps", get(list_apps).post(register_app))
        .route("/api/v1/apps/:app_id", get(get_app))
        .route("/api/v1/apps/:app_id/actions/:action", post(proxy_action))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct RegisterAppRequest {
    app_id: String,
    container_url: String,
    #[serde(default)]
    manifest: serde_json::Value,
}

pub async fn register_app(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<RegisterAppRequest>,
) -> Result<Json<RegisteredApp>> {
    require_internal_key(&state.internal_api_key, &headers)?;
    Ok(Json(state.registry.register_app(&req.app_id, &req.container_url, req.manifest)))
}

pub async fn list_apps(State(state): State<Arc<AppState>>) -> Json<Vec<RegisteredApp>> {
    Json(state.registry.list_apps())
}

pub async fn get_app(State(state): State<Arc<AppState>>, Path(app_id): Path<String>) -> Result<Json<RegisteredApp>> {
    state
        .registry
        .get_app(&app_id)
        .map(Json)
        .ok_or(RegistryError::UnknownApp(app_id))
}

pub async fn proxy_action(
    State(state): State<Arc<AppState>>,
    Path((app_id, action)): Path<(String, String)>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>> {
    Ok(Json(state.registry.proxy_action(&app_id, &action, payload).await?))
}

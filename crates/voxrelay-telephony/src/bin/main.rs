//! Composition root for the telephony adapter process: connect to the
//! shared call database, wire up the gateway/bridge clients, then serve the
//! carrier-facing webhooks and media-stream socket.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use voxrelay_telephony::config::TelephonyConfig;
use voxrelay_telephony::db;
use voxrelay_telephony::server::build_router;
use voxrelay_telephony::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = TelephonyConfig::from_env()?;
    tracing::info!(bind_addr = %config.bind_addr, "starting voxrelay telephony adapter");

    let pool = db::connect(&config.database_url).await?;
    let state = Arc::new(AppState::new(config.clone(), pool));

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

//! Composition root for the registry process: build the app table, spawn
//! its health-check sweep, then serve the registration/discovery API.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use voxrelay_registry::config::RegistryConfig;
use voxrelay_registry::registry::{run_health_check_loop, Registry};
use voxrelay_registry::server::{build_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = RegistryConfig::from_env()?;
    tracing::info!(bind_addr = %config.bind_addr, "starting voxrelay registry");

    let internal_api_key = config.internal_api_key.clone();
    let registry = Arc::new(Registry::new(config.clone()));

    tokio::spawn(run_health_check_loop(registry.clone()));

    let state = Arc::new(AppState { registry, internal_api_key });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

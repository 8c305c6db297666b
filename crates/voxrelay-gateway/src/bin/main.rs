//! Composition root for the gateway process: load configuration, connect
//! the database, wire up the broker/registry/fabric/call-manager, spawn the
//! background tasks, then serve.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use voxrelay_gateway::bridge_client::BridgeClient;
use voxrelay_gateway::broker::{AmqpBroker, LocalBroker, NotificationBroker};
use voxrelay_gateway::config::GatewayConfig;
use voxrelay_gateway::db;
use voxrelay_gateway::fabric::NotificationFabric;
use voxrelay_gateway::orchestrator::{run_timeout_monitor, CallManager};
use voxrelay_gateway::server::{build_router, AppState};
use voxrelay_gateway::ws_registry::WsRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = GatewayConfig::from_env()?;
    tracing::info!(bind_addr = %config.bind_addr, "starting voxrelay gateway");

    let pool = db::connect(&config.database_url).await?;
    let broker: Arc<dyn NotificationBroker> = match &config.amqp_url {
        Some(url) => {
            tracing::info!("connecting to AMQP broker for multi-instance fanout");
            Arc::new(AmqpBroker::connect(url).await?)
        }
        None => Arc::new(LocalBroker::new()),
    };
    let ws_registry = Arc::new(WsRegistry::new());
    let fabric = Arc::new(NotificationFabric::new(pool.clone(), ws_registry.clone()));
    let call_manager = CallManager::new(pool.clone(), broker.clone(), ws_registry.clone(), config.clone()).await?;
    let bridge = BridgeClient::new(&config);

    tokio::spawn(run_timeout_monitor(call_manager.clone(), config.timeout_check_interval));
    tokio::spawn(fabric.clone().run_sweep_loop(config.pending_notification_retention));

    let state = Arc::new(AppState {
        call_manager,
        fabric,
        broker,
        ws_registry,
        bridge,
        pool,
        config: config.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

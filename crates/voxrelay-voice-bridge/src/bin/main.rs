//! Composition root for the voice bridge process: build the STT/TTS
//! providers, wire up the bridge manager, spawn the debounce sweep, then
//! serve its internal HTTP ingress.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use voxrelay_voice_bridge::bridge::BridgeManager;
use voxrelay_voice_bridge::config::BridgeConfig;
use voxrelay_voice_bridge::server::{build_router, AppState};
use voxrelay_voice_bridge::stt::{FallbackSttProvider, SttProvider};
use voxrelay_voice_bridge::tts::{FallbackTtsProvider, TtsProvider};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BridgeConfig::from_env()?;
    tracing::info!(bind_addr = %config.bind_addr, "starting voxrelay voice bridge");

    let stt: Arc<dyn SttProvider> = Arc::new(FallbackSttProvider::new(&config));
    let tts: Arc<dyn TtsProvider> = Arc::new(FallbackTtsProvider::new(&config));
    let bridge = BridgeManager::new(config.clone(), stt, tts);

    tokio::spawn(bridge.clone().run_debounce_loop());

    let state = Arc::new(AppState {
        bridge,
        internal_api_key: config.internal_api_key.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, build_router(state)).await?;

    Ok(())
}

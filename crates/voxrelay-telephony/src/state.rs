//! Shared adapter state: live carrier media-stream sockets plus the
//! downstream clients every handler needs.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use sqlx::sqlite::SqlitePool;
use tokio::sync::Mutex;

use crate::bridge_client::BridgeClient;
use crate::config::TelephonyConfig;
use crate::gateway_client::GatewayClient;

pub struct MediaStream {
    pub session_id: String,
    pub call_id: uuid::Uuid,
    pub stream_sid: String,
    pub sink: Mutex<SplitSink<WebSocket, Message>>,
}

pub struct AppState {
    pub config: TelephonyConfig,
    pub pool: SqlitePool,
    pub gateway: GatewayClient,
    pub bridge: BridgeClient,
    /// Live streams keyed by carrier call sid, the map the TTS consumer
    /// looks up to write `media` frames.
    pub streams: DashMap<String, Arc<MediaStream>>,
    active_call_count: AtomicUsize,
}

impl AppState {
    pub fn new(config: TelephonyConfig, pool: SqlitePool) -> Self {
        let gateway = GatewayClient::new(&config);
        let bridge = BridgeClient::new(&config);
        Self {
            config,
            pool,
            gateway,
            bridge,
            streams: DashMap::new(),
            active_call_count: AtomicUsize::new(0),
        }
    }

    pub fn at_capacity(&self) -> bool {
        self.active_call_count.load(Ordering::SeqCst) >= self.config.max_concurrent_calls
    }

    pub fn call_started(&self) {
        self.active_call_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn call_finished(&self) {
        let _ = self
            .active_call_count
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| Some(n.saturating_sub(1)));
    }
}

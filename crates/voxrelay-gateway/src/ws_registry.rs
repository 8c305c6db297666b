//! Per-session WebSocket registry.
//!
//! Grounded on the original `websocket_manager.py`'s `ConnectionManager`:
//! a session may have multiple live sockets (multiple browser tabs), and a
//! failed send evicts just that socket rather than the whole session.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use tokio::sync::Mutex;
use voxrelay_core::Notification;

type Sink = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// Tracks live WebSocket senders grouped by `session_id`.
#[derive(Default)]
pub struct WsRegistry {
    sessions: DashMap<String, Vec<(u64, Sink)>>,
    next_id: std::sync::atomic::AtomicU64,
}

impl WsRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Registers a new socket for `session_id`, returning a handle used to
    /// remove it again on disconnect.
    pub fn connect(&self, session_id: &str, sink: Sink) -> u64 {
        let id = self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.sessions.entry(session_id.to_string()).or_default().push((id, sink));
        id
    }

    /// Removes one socket; when the session's socket list empties, the key
    /// itself is removed.
    pub fn disconnect(&self, session_id: &str, handle: u64) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.retain(|(id, _)| *id != handle);
            if entry.is_empty() {
                drop(entry);
                self.sessions.remove(session_id);
            }
        }
    }

    pub fn has_socket(&self, session_id: &str) -> bool {
        self.sessions.get(session_id).map(|v| !v.is_empty()).unwrap_or(false)
    }

    pub fn active_session_ids(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }

    pub fn connection_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map(|v| v.len()).unwrap_or(0)
    }

    pub fn total_connections(&self) -> usize {
        self.sessions.iter().map(|e| e.value().len()).sum()
    }

    /// Delivers `notification` to every socket registered for `session_id`.
    /// Returns `true` if at least one socket received it. Sockets whose
    /// send fails are evicted.
    pub async fn send_notification(&self, session_id: &str, notification: &Notification) -> bool {
        let text = match serde_json::to_string(&serde_json::json!({
            "type": "notification",
            "data": notification,
        })) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize notification");
                return false;
            }
        };
        self.send_raw_to_session(session_id, text).await
    }

    pub async fn send_raw_to_session(&self, session_id: &str, text: String) -> bool {
        let Some(sockets) = self.sessions.get(session_id).map(|v| v.clone()) else {
            return false;
        };
        let mut delivered = false;
        let mut dead = Vec::new();
        for (id, sink) in sockets {
            let mut guard = sink.lock().await;
            if guard.send(Message::Text(text.clone())).await.is_ok() {
                delivered = true;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            self.disconnect(session_id, id);
        }
        delivered
    }

    /// Delivers a binary frame (TTS PCM/WAV audio) to every socket
    /// registered for `session_id`.
    pub async fn send_binary_to_session(&self, session_id: &str, data: Vec<u8>) -> bool {
        let Some(sockets) = self.sessions.get(session_id).map(|v| v.clone()) else {
            return false;
        };
        let mut delivered = false;
        let mut dead = Vec::new();
        for (id, sink) in sockets {
            let mut guard = sink.lock().await;
            if guard.send(Message::Binary(data.clone())).await.is_ok() {
                delivered = true;
            } else {
                dead.push(id);
            }
        }
        for id in dead {
            self.disconnect(session_id, id);
        }
        delivered
    }

    /// Iterates every known session and delivers `notification` to each.
    pub async fn broadcast_notification(&self, notification: &Notification) {
        let session_ids = self.active_session_ids();
        for session_id in session_ids {
            self.send_notification(&session_id, notification).await;
        }
    }
}

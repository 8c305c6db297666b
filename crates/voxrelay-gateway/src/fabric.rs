//! The notification fabric: routes a `Notification` to live sockets,
//! falls back to durable storage, and replays stored notifications when a
//! client reconnects.

use std::sync::Arc;

use sqlx::sqlite::SqlitePool;
use voxrelay_core::{Notification, PendingNotification};

use crate::db;
use crate::error::Result;
use crate::ws_registry::WsRegistry;

pub struct NotificationFabric {
    pool: SqlitePool,
    ws_registry: Arc<WsRegistry>,
}

impl NotificationFabric {
    pub fn new(pool: SqlitePool, ws_registry: Arc<WsRegistry>) -> Self {
        Self { pool, ws_registry }
    }

    /// Routes one notification: broadcast to every socket, direct delivery
    /// to a connected session's socket, or persisted as pending if the
    /// session has no live socket right now.
    pub async fn route(&self, notification: &Notification) -> Result<()> {
        match &notification.session_id {
            None => {
                // Broadcast: every registered socket on this instance.
                self.ws_registry.broadcast_notification(notification).await;
                Ok(())
            }
            Some(session_id) => {
                if self.ws_registry.has_socket(session_id) {
                    self.ws_registry.send_notification(session_id, notification).await;
                    Ok(())
                } else {
                    let pending = PendingNotification::from_notification(notification);
                    db::pending::upsert(&self.pool, &pending).await
                }
            }
        }
    }

    /// Replays every undelivered pending notification for a session that
    /// just connected, in `created_at` order.
    pub async fn replay_pending(&self, session_id: &str) -> Result<()> {
        let rows = db::pending::undelivered_for_session(&self.pool, session_id).await?;
        for row in rows {
            let delivered = self
                .ws_registry
                .send_raw_to_session(
                    session_id,
                    serde_json::json!({
                        "type": "notification",
                        "data": {
                            "notification_id": row.notification_id,
                            "notification_type": row.notification_type,
                            "payload": row.notification_payload,
                            "session_id": row.session_id,
                        }
                    })
                    .to_string(),
                )
                .await;
            if delivered {
                db::pending::mark_delivered(&self.pool, row.id).await?;
            } else {
                db::pending::record_attempt_failure(&self.pool, row.id).await?;
            }
        }
        Ok(())
    }

    /// Background sweep task body; spawned once at startup alongside the
    /// call manager's timeout monitor.
    pub async fn run_sweep_loop(self: Arc<Self>, retention: std::time::Duration) {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
        loop {
            interval.tick().await;
            match db::pending::sweep_delivered_older_than(
                &self.pool,
                chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::days(7)),
            )
            .await
            {
                Ok(n) if n > 0 => tracing::info!(rows_removed = n, "swept delivered pending notifications"),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "pending notification sweep failed"),
            }
        }
    }
}

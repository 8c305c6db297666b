//! Integration tests for the notification fabric's store-and-forward path
//!: live delivery vs. pending storage, and replay on reconnect.

use std::sync::Arc;

use serial_test::serial;
use uuid::Uuid;
use voxrelay_core::{Notification, NotificationPayload};
use voxrelay_gateway::db;
use voxrelay_gateway::fabric::NotificationFabric;
use voxrelay_gateway::ws_registry::WsRegistry;

fn system_alert(session_id: Option<&str>) -> Notification {
    Notification {
        notification_id: Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        recipient_agent_id: None,
        session_id: session_id.map(|s| s.to_string()),
        user_id: None,
        source: "test".to_string(),
        payload: NotificationPayload::SystemAlert {
            message: "hello".to_string(),
            severity: "info".to_string(),
        },
    }
}

#[tokio::test]
#[serial]
async fn routes_to_pending_storage_when_no_socket_is_registered() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let ws_registry = Arc::new(WsRegistry::new());
    let fabric = NotificationFabric::new(pool.clone(), ws_registry);

    let notification = system_alert(Some("session-no-socket"));
    fabric.route(&notification).await.expect("route");

    let pending = db::pending::undelivered_for_session(&pool, "session-no-socket")
        .await
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].notification_id, notification.notification_id);
}

#[tokio::test]
#[serial]
async fn a_second_route_with_the_same_notification_id_does_not_duplicate_storage() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let ws_registry = Arc::new(WsRegistry::new());
    let fabric = NotificationFabric::new(pool.clone(), ws_registry);

    let notification = system_alert(Some("session-dup"));
    fabric.route(&notification).await.unwrap();
    fabric.route(&notification).await.unwrap();

    let pending = db::pending::undelivered_for_session(&pool, "session-dup").await.unwrap();
    assert_eq!(pending.len(), 1, "routing the same notification_id twice must not duplicate the pending row");
}

#[tokio::test]
#[serial]
async fn sweep_only_removes_delivered_rows_past_retention() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let ws_registry = Arc::new(WsRegistry::new());
    let fabric = NotificationFabric::new(pool.clone(), ws_registry);

    let undelivered = system_alert(Some("session-keep"));
    fabric.route(&undelivered).await.unwrap();

    let delivered = system_alert(Some("session-sweep"));
    fabric.route(&delivered).await.unwrap();
    let rows = db::pending::undelivered_for_session(&pool, "session-sweep").await.unwrap();
    db::pending::mark_delivered(&pool, rows[0].id).await.unwrap();

    // Zero retention: the delivered row is immediately eligible for the sweep.
    let removed = db::pending::sweep_delivered_older_than(&pool, chrono::Duration::seconds(-1))
        .await
        .unwrap();
    assert_eq!(removed, 1);

    // The never-delivered row for session-keep must survive any sweep.
    let still_pending = db::pending::undelivered_for_session(&pool, "session-keep").await.unwrap();
    assert_eq!(still_pending.len(), 1);
}

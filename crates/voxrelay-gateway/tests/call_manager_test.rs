//! Integration tests for the call state machine.
//!
//! These exercise `CallManager` end to end against an in-memory SQLite pool
//! and an in-process broker, mirroring the call-engine test pattern of
//! standing up a real engine against a `:memory:` database rather than
//! mocking the storage layer.

use std::sync::Arc;
use std::time::Duration;

use serial_test::serial;
use voxrelay_core::CallEndReason;
use voxrelay_gateway::broker::{LocalBroker, NotificationBroker};
use voxrelay_gateway::config::GatewayConfig;
use voxrelay_gateway::db;
use voxrelay_gateway::orchestrator::CallManager;
use voxrelay_gateway::ws_registry::WsRegistry;

fn test_config() -> GatewayConfig {
    GatewayConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "test-secret".to_string(),
        jwt_expiration_minutes: 60,
        internal_api_key: "test-internal-key".to_string(),
        pending_notification_retention: Duration::from_secs(7 * 24 * 3600),
        ringing_timeout: Duration::from_secs(30),
        hold_timeout: Duration::from_secs(300),
        max_call_duration: Duration::from_secs(1800),
        timeout_check_interval: Duration::from_secs(5),
    }
}

async fn new_manager() -> (Arc<CallManager>, Arc<LocalBroker>) {
    let pool = db::connect("sqlite::memory:").await.expect("in-memory pool");
    let broker = Arc::new(LocalBroker::new());
    let ws_registry = Arc::new(WsRegistry::new());
    let manager = CallManager::new(pool, broker.clone(), ws_registry, test_config())
        .await
        .expect("call manager construction");
    (manager, broker)
}

#[tokio::test]
#[serial]
async fn initiate_answer_hold_resume_end_round_trip() {
    let (manager, broker) = new_manager().await;
    let mut agent_queue = broker.register_agent_queue("agent-1");

    let call = manager
        .initiate_call("session-1", "user", "agent-1", false)
        .await
        .expect("initiate_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::RingingOutbound);

    let incoming = agent_queue.recv().await.expect("incoming_call message");
    assert_eq!(incoming.message_type, "incoming_call");
    assert_eq!(incoming.call_id, Some(call.call_id));

    let call = manager.answer_call(call.call_id, "agent-1").await.expect("answer_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::Connected);
    assert!(call.connected_at.is_some());

    let call = manager.hold_call(call.call_id, "manual").await.expect("hold_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::OnHold);
    let hold_msg = agent_queue.recv().await.expect("call_hold message");
    assert_eq!(hold_msg.message_type, "call_hold");

    let call = manager.resume_call(call.call_id).await.expect("resume_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::Connected);
    let resume_msg = agent_queue.recv().await.expect("call_resume message");
    assert_eq!(resume_msg.message_type, "call_resume");

    let call = manager
        .end_call(call.call_id, "user", None)
        .await
        .expect("end_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::Ended);
    assert_eq!(call.end_reason, Some(CallEndReason::UserHangup));

    // Terminal: no further transitions.
    let result = manager.end_call(call.call_id, "user", None).await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn answer_call_is_idempotent_when_already_connected() {
    let (manager, _broker) = new_manager().await;
    let call = manager.initiate_call("session-2", "user", "agent-1", false).await.unwrap();
    let call = manager.answer_call(call.call_id, "agent-1").await.unwrap();
    let connected_at = call.connected_at;

    // Re-answering with a different agent should take over current_agent_id
    // without erroring or re-setting connected_at.
    let call = manager.answer_call(call.call_id, "agent-2").await.expect("idempotent re-answer");
    assert_eq!(call.status, voxrelay_core::CallStatus::Connected);
    assert_eq!(call.current_agent_id.as_deref(), Some("agent-2"));
    assert_eq!(call.connected_at, connected_at);
}

#[tokio::test]
#[serial]
async fn transfer_call_moves_current_agent_and_notifies_receiver() {
    let (manager, broker) = new_manager().await;
    let mut to_queue = broker.register_agent_queue("agent-2");

    let call = manager.initiate_call("session-3", "user", "agent-1", false).await.unwrap();
    let call = manager.answer_call(call.call_id, "agent-1").await.unwrap();

    let call = manager
        .transfer_call(call.call_id, "agent-1", "agent-2", Some("warm handoff".to_string()))
        .await
        .expect("transfer_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::Connected);
    assert_eq!(call.current_agent_id.as_deref(), Some("agent-2"));

    let msg = to_queue.recv().await.expect("call_transferred message");
    assert_eq!(msg.message_type, "call_transferred");
}

#[tokio::test]
#[serial]
async fn transfer_call_rejects_non_current_handler() {
    let (manager, _broker) = new_manager().await;
    let call = manager.initiate_call("session-4", "user", "agent-1", false).await.unwrap();
    let call = manager.answer_call(call.call_id, "agent-1").await.unwrap();

    let result = manager.transfer_call(call.call_id, "agent-2", "agent-3", None).await;
    assert!(result.is_err(), "transfer_call must reject a from_agent that isn't the current handler");
}

#[tokio::test]
#[serial]
async fn a_session_cannot_have_two_concurrent_non_ended_calls() {
    let (manager, _broker) = new_manager().await;
    manager.initiate_call("session-5", "user", "agent-1", false).await.unwrap();
    let result = manager.initiate_call("session-5", "user", "agent-2", false).await;
    assert!(result.is_err());
}

#[tokio::test]
#[serial]
async fn decline_call_only_valid_while_ringing() {
    let (manager, _broker) = new_manager().await;
    let call = manager.initiate_call("session-6", "user", "agent-1", false).await.unwrap();
    let call = manager.decline_call(call.call_id, "agent-1", Some("busy".to_string())).await.expect("decline_call");
    assert_eq!(call.status, voxrelay_core::CallStatus::Ended);
    assert_eq!(call.end_reason, Some(CallEndReason::AgentDeclined));

    let result = manager.decline_call(call.call_id, "agent-1", None).await;
    assert!(result.is_err(), "cannot decline an already-ended call");
}

#[tokio::test]
#[serial]
async fn restore_from_db_reloads_non_terminal_calls_on_restart() {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let broker: Arc<dyn NotificationBroker> = Arc::new(LocalBroker::new());
    let ws_registry = Arc::new(WsRegistry::new());

    let manager = CallManager::new(pool.clone(), broker.clone(), ws_registry.clone(), test_config())
        .await
        .unwrap();
    let call = manager.initiate_call("session-7", "user", "agent-1", false).await.unwrap();

    // Simulate a process restart: a fresh manager over the same pool.
    let restarted = CallManager::new(pool, broker, ws_registry, test_config()).await.unwrap();
    let restored = restarted.get_call(call.call_id).expect("call survives restart");
    assert_eq!(restored.status, voxrelay_core::CallStatus::RingingOutbound);
}

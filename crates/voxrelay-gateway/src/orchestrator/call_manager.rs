use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use sqlx::sqlite::SqlitePool;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;
use voxrelay_core::{
    AgentMessage, Call, CallEndReason, CallEvent, CallParticipant, CallSource, CallStatus,
    ParticipantRole,
};

use crate::broker::NotificationBroker;
use crate::config::GatewayConfig;
use crate::db;
use crate::error::{GatewayError, Result};
use crate::telephony_client::TelephonyClient;
use crate::ws_registry::WsRegistry;

/// Shared state behind every `CallManager` clone. `active_calls` is the
/// in-memory arena described in "Cyclic references and ownership":
/// the authoritative read path for a running call, kept consistent with the
/// database at the end of every operation under `op_lock`.
pub struct CallManagerState {
    pub(super) pool: SqlitePool,
    pub(super) broker: Arc<dyn NotificationBroker>,
    pub(super) ws_registry: Arc<WsRegistry>,
    pub(super) active_calls: DashMap<Uuid, Call>,
    pub(super) session_index: DashMap<String, Uuid>,
    /// Serializes every state-changing operation: one lock per manager, not
    /// per call, so operations on different calls never interleave their
    /// persist-then-publish steps.
    pub(super) op_lock: Mutex<()>,
    pub(super) config: GatewayConfig,
    pub(super) telephony: TelephonyClient,
}

/// Authoritative owner of every in-flight Call. Cheap to clone — an
/// `Arc` handle to the shared state, the same shape `call-engine`'s
/// `CallCenterEngine` takes.
#[derive(Clone)]
pub struct CallManager(Arc<CallManagerState>);

impl CallManager {
    /// Constructs the manager and restores every non-terminal call from the
    /// database so timeouts keep firing across a process restart.
    pub async fn new(
        pool: SqlitePool,
        broker: Arc<dyn NotificationBroker>,
        ws_registry: Arc<WsRegistry>,
        config: GatewayConfig,
    ) -> Result<Arc<Self>> {
        let telephony = TelephonyClient::new(&config);
        let state = Arc::new(CallManagerState {
            pool,
            broker,
            ws_registry,
            active_calls: DashMap::new(),
            session_index: DashMap::new(),
            op_lock: Mutex::new(()),
            config,
            telephony,
        });
        let manager = Arc::new(CallManager(state));
        manager.restore_from_db().await?;
        Ok(manager)
    }

    async fn restore_from_db(&self) -> Result<()> {
        let calls = db::calls::list_non_terminal_calls(&self.0.pool).await?;
        for call in calls {
            info!(call_id = %call.call_id, status = ?call.status, "restoring in-flight call on startup");
            self.0.session_index.insert(call.session_id.clone(), call.call_id);
            self.0.active_calls.insert(call.call_id, call);
        }
        Ok(())
    }

    pub fn get_call(&self, call_id: Uuid) -> Option<Call> {
        self.0.active_calls.get(&call_id).map(|c| c.value().clone())
    }

    pub fn get_call_by_session(&self, session_id: &str) -> Option<Call> {
        self.0
            .session_index
            .get(session_id)
            .and_then(|id| self.get_call(*id))
    }

    pub fn list_active_calls(&self) -> Vec<Call> {
        self.0.active_calls.iter().map(|e| e.value().clone()).collect()
    }

    pub(crate) fn config(&self) -> &GatewayConfig {
        &self.0.config
    }

    /// Calls whose current state has outlived the relevant timeout (used by
    /// the timeout monitor task).
    pub(crate) fn timed_out_calls(&self, now: chrono::DateTime<Utc>) -> Vec<Uuid> {
        let cfg = &self.0.config;
        self.0
            .active_calls
            .iter()
            .filter_map(|entry| {
                let call = entry.value();
                let overdue = match call.status {
                    CallStatus::RingingOutbound | CallStatus::RingingInbound => call
                        .ringing_at
                        .map(|t| now - t > chrono::Duration::from_std(cfg.ringing_timeout).unwrap())
                        .unwrap_or(false),
                    CallStatus::OnHold => call
                        .metadata
                        .get("hold_started_at")
                        .and_then(|v| v.as_str())
                        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
                        .map(|t| now - t.with_timezone(&Utc) > chrono::Duration::from_std(cfg.hold_timeout).unwrap())
                        .unwrap_or(false),
                    CallStatus::Connected => call
                        .connected_at
                        .map(|t| now - t > chrono::Duration::from_std(cfg.max_call_duration).unwrap())
                        .unwrap_or(false),
                    CallStatus::Transferring | CallStatus::Ended => false,
                };
                overdue.then_some(*entry.key())
            })
            .collect()
    }

    async fn record_event(
        &self,
        call_id: Uuid,
        event_type: &str,
        event_data: serde_json::Value,
        triggered_by: &str,
    ) -> Result<()> {
        db::calls::insert_event(
            &self.0.pool,
            &CallEvent {
                call_id,
                event_type: event_type.to_string(),
                event_data,
                triggered_by: triggered_by.to_string(),
                ts: Utc::now(),
            },
        )
        .await
    }

    /// Call-lifecycle events are not part of the `Notification` tagged
    /// union — they are sent as their own raw WS frames,
    /// mirroring how the original emits `call_ringing`/`call_connected`
    /// directly rather than through the generic notification publisher.
    async fn emit_ui_event(&self, session_id: &str, event_type: &str, data: serde_json::Value) {
        let frame = serde_json::json!({ "type": event_type, "data": data }).to_string();
        self.0.ws_registry.send_raw_to_session(session_id, frame).await;
    }

    async fn persist_and_index(&self, call: &Call) -> Result<()> {
        db::calls::save_call(&self.0.pool, call).await?;
        self.0.active_calls.insert(call.call_id, call.clone());
        if call.status.is_ended() {
            self.0.session_index.remove(&call.session_id);
        }
        Ok(())
    }

    pub async fn initiate_call(
        &self,
        session_id: &str,
        initiated_by: &str,
        target_agent: &str,
        fast_mode: bool,
    ) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        if self.get_call_by_session(session_id).is_some() {
            return Err(GatewayError::invalid_state(format!(
                "session {session_id} already has a non-ended call"
            )));
        }

        let now = Utc::now();
        let status = if initiated_by == "user" {
            CallStatus::RingingOutbound
        } else {
            CallStatus::RingingInbound
        };

        let mut metadata = HashMap::new();
        if fast_mode {
            metadata.insert("fast_mode".to_string(), serde_json::Value::Bool(true));
        }

        let call = Call {
            call_id: Uuid::new_v4(),
            session_id: session_id.to_string(),
            initiated_by: initiated_by.to_string(),
            initial_target: target_agent.to_string(),
            current_agent_id: None,
            status,
            started_at: now,
            ringing_at: Some(now),
            connected_at: None,
            ended_at: None,
            end_reason: None,
            ended_by: None,
            metadata,
            twilio_call_sid: None,
            caller_phone_number: None,
            call_source: Some(CallSource::Web),
        };

        db::calls::insert_call(&self.0.pool, &call).await?;
        self.0.active_calls.insert(call.call_id, call.clone());
        self.0.session_index.insert(session_id.to_string(), call.call_id);

        self.record_event(
            call.call_id,
            "call_initiated",
            serde_json::json!({ "target_agent": target_agent, "initiated_by": initiated_by }),
            initiated_by,
        )
        .await?;

        self.0
            .broker
            .publish_to_agent(
                target_agent,
                AgentMessage::new(
                    "incoming_call",
                    serde_json::json!({ "initiated_by": initiated_by, "fast_mode": fast_mode }),
                )
                .with_call(call.call_id, session_id),
            )
            .await?;

        self.emit_ui_event(
            session_id,
            "call_ringing",
            serde_json::json!({ "call_id": call.call_id, "target_agent": target_agent }),
        )
        .await;

        Ok(call)
    }

    /// Idempotent: re-answering an already-`connected` call succeeds
    /// without changing state, except that an agent answerer may still
    /// take over `current_agent_id`.
    pub async fn answer_call(&self, call_id: Uuid, answered_by: &str) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        let mut call = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?;

        if call.status.is_ended() {
            return Err(GatewayError::invalid_state("cannot answer an ended call"));
        }

        if call.status == CallStatus::Connected {
            if answered_by != "user" {
                call.current_agent_id = Some(answered_by.to_string());
                self.persist_and_index(&call).await?;
            }
            return Ok(call);
        }

        if !call.status.is_ringing() {
            return Err(GatewayError::invalid_state(format!(
                "cannot answer call in state {:?}",
                call.status
            )));
        }

        let now = Utc::now();
        call.status = CallStatus::Connected;
        call.connected_at = Some(now);
        if answered_by != "user" {
            call.current_agent_id = Some(answered_by.to_string());
        }

        self.persist_and_index(&call).await?;

        db::calls::insert_participant(
            &self.0.pool,
            &CallParticipant {
                call_id,
                agent_id: call.current_agent_id.clone().unwrap_or_else(|| call.initial_target.clone()),
                role: ParticipantRole::Receiver,
                joined_at: now,
                left_at: None,
                transferred_from: None,
            },
        )
        .await?;

        self.record_event(call_id, "call_answered", serde_json::json!({ "answered_by": answered_by }), answered_by)
            .await?;

        if answered_by != "user" {
            self.emit_ui_event(
                &call.session_id,
                "call_answered",
                serde_json::json!({ "call_id": call_id, "answered_by": answered_by }),
            )
            .await;
        }

        Ok(call)
    }

    pub async fn decline_call(&self, call_id: Uuid, declined_by: &str, reason: Option<String>) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        let mut call = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?;

        if !call.status.is_ringing() {
            return Err(GatewayError::invalid_state("decline_call is only valid while ringing"));
        }

        let end_reason = if declined_by == "user" {
            CallEndReason::UserDeclined
        } else {
            CallEndReason::AgentDeclined
        };

        call.status = CallStatus::Ended;
        call.ended_at = Some(Utc::now());
        call.end_reason = Some(end_reason);
        call.ended_by = Some(declined_by.to_string());

        self.persist_and_index(&call).await?;
        self.record_event(
            call_id,
            "call_declined",
            serde_json::json!({ "declined_by": declined_by, "reason": reason }),
            declined_by,
        )
        .await?;
        self.emit_ui_event(&call.session_id, "call_ended", serde_json::json!({ "call_id": call_id, "reason": "declined" }))
            .await;

        Ok(call)
    }

    pub async fn end_call(&self, call_id: Uuid, ended_by: &str, reason: Option<CallEndReason>) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;
        self.end_call_locked(call_id, ended_by, reason).await
    }

    /// Shared by `end_call` and the timeout monitor, which already holds
    /// `op_lock` when it calls in.
    pub(super) async fn end_call_locked(
        &self,
        call_id: Uuid,
        ended_by: &str,
        reason: Option<CallEndReason>,
    ) -> Result<Call> {
        let mut call = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?;

        if call.status.is_ended() {
            return Err(GatewayError::invalid_state("call is already ended"));
        }

        let default_reason = if ended_by == "user" {
            CallEndReason::UserHangup
        } else {
            CallEndReason::AgentHangup
        };

        let now = Utc::now();
        call.status = CallStatus::Ended;
        call.ended_at = Some(now);
        call.end_reason = Some(reason.unwrap_or(default_reason));
        call.ended_by = Some(ended_by.to_string());

        self.persist_and_index(&call).await?;
        db::calls::close_current_participant(&self.0.pool, call_id, now).await?;
        self.record_event(
            call_id,
            "call_ended",
            serde_json::json!({ "ended_by": ended_by, "reason": call.end_reason }),
            ended_by,
        )
        .await?;

        self.emit_ui_event(
            &call.session_id,
            "call_ended",
            serde_json::json!({ "call_id": call_id, "reason": call.end_reason }),
        )
        .await;

        if let Some(sid) = &call.twilio_call_sid {
            if let Err(err) = self.0.telephony.terminate_call(sid).await {
                warn!(call_id = %call_id, twilio_call_sid = %sid, error = %err, "failed to terminate carrier leg");
            }
        }

        Ok(call)
    }

    pub async fn hold_call(&self, call_id: Uuid, reason: &str) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        let mut call = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?;

        if call.status != CallStatus::Connected {
            return Err(GatewayError::invalid_state("hold_call is only valid while connected"));
        }

        call.status = CallStatus::OnHold;
        call.metadata
            .insert("hold_started_at".to_string(), serde_json::Value::String(Utc::now().to_rfc3339()));
        call.metadata
            .insert("hold_reason".to_string(), serde_json::Value::String(reason.to_string()));

        self.persist_and_index(&call).await?;
        self.record_event(call_id, "call_held", serde_json::json!({ "reason": reason }), "system")
            .await?;

        if let Some(agent_id) = &call.current_agent_id {
            self.0
                .broker
                .publish_to_agent(
                    agent_id,
                    AgentMessage::new(
                        "call_hold",
                        serde_json::json!({ "instruction": "do not use speak tool while on hold" }),
                    )
                    .with_call(call_id, &call.session_id),
                )
                .await?;
        }

        Ok(call)
    }

    pub async fn resume_call(&self, call_id: Uuid) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        let mut call = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?;

        if call.status != CallStatus::OnHold {
            return Err(GatewayError::invalid_state("resume_call is only valid while on hold"));
        }

        call.status = CallStatus::Connected;
        call.metadata.remove("hold_started_at");
        call.metadata.remove("hold_reason");

        self.persist_and_index(&call).await?;
        self.record_event(call_id, "call_resumed", serde_json::json!({}), "system").await?;

        if let Some(agent_id) = &call.current_agent_id {
            self.0
                .broker
                .publish_to_agent(
                    agent_id,
                    AgentMessage::new("call_resume", serde_json::json!({})).with_call(call_id, &call.session_id),
                )
                .await?;
        }

        Ok(call)
    }

    pub async fn transfer_call(
        &self,
        call_id: Uuid,
        from_agent: &str,
        to_agent: &str,
        announcement: Option<String>,
    ) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        let mut call = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?;

        if call.status != CallStatus::Connected {
            return Err(GatewayError::invalid_state("transfer_call is only valid while connected"));
        }
        if call.current_agent_id.as_deref() != Some(from_agent) {
            return Err(GatewayError::invalid_state(
                "transfer_call requires from_agent to be the current handler",
            ));
        }

        call.status = CallStatus::Transferring;
        self.persist_and_index(&call).await?;

        let now = Utc::now();
        db::calls::close_current_participant(&self.0.pool, call_id, now).await?;
        db::calls::insert_participant(
            &self.0.pool,
            &CallParticipant {
                call_id,
                agent_id: to_agent.to_string(),
                role: ParticipantRole::Transferred,
                joined_at: now,
                left_at: None,
                transferred_from: Some(from_agent.to_string()),
            },
        )
        .await?;

        call.current_agent_id = Some(to_agent.to_string());
        call.status = CallStatus::Connected;
        self.persist_and_index(&call).await?;

        self.record_event(
            call_id,
            "call_transferred",
            serde_json::json!({ "from_agent": from_agent, "to_agent": to_agent, "announcement": announcement }),
            from_agent,
        )
        .await?;

        self.0
            .broker
            .publish_to_agent(
                to_agent,
                AgentMessage::new(
                    "call_transferred",
                    serde_json::json!({ "from_agent": from_agent, "announcement": announcement }),
                )
                .with_call(call_id, &call.session_id),
            )
            .await?;

        self.emit_ui_event(
            &call.session_id,
            "call_connected",
            serde_json::json!({ "call_id": call_id, "transferred_from": from_agent, "current_agent_id": to_agent }),
        )
        .await;

        Ok(call)
    }

    /// Registers a Call row for a carrier-originated session (inbound) or
    /// marks it answered (outbound), so carrier call management falls
    /// through the same state machine as a web call. Idempotent on
    /// `call_id`: a second registration for the same id returns the
    /// existing row unchanged.
    #[allow(clippy::too_many_arguments)]
    pub async fn register_phone_call(
        &self,
        call_id: Uuid,
        session_id: &str,
        target_agent: &str,
        carrier_call_sid: &str,
        caller_phone_number: Option<String>,
        call_source: CallSource,
    ) -> Result<Call> {
        let _guard = self.0.op_lock.lock().await;

        if let Some(existing) = self.get_call(call_id) {
            return Ok(existing);
        }

        let now = Utc::now();
        let call = Call {
            call_id,
            session_id: session_id.to_string(),
            initiated_by: "phone".to_string(),
            initial_target: target_agent.to_string(),
            current_agent_id: None,
            status: CallStatus::RingingInbound,
            started_at: now,
            ringing_at: Some(now),
            connected_at: None,
            ended_at: None,
            end_reason: None,
            ended_by: None,
            metadata: HashMap::new(),
            twilio_call_sid: Some(carrier_call_sid.to_string()),
            caller_phone_number,
            call_source: Some(call_source),
        };

        db::calls::insert_call(&self.0.pool, &call).await?;
        self.0.active_calls.insert(call.call_id, call.clone());
        self.0.session_index.insert(session_id.to_string(), call.call_id);

        self.record_event(
            call.call_id,
            "call_initiated",
            serde_json::json!({ "target_agent": target_agent, "initiated_by": "phone" }),
            "system",
        )
        .await?;

        self.0
            .broker
            .publish_to_agent(
                target_agent,
                AgentMessage::new("incoming_call", serde_json::json!({ "initiated_by": "phone" }))
                    .with_call(call.call_id, session_id),
            )
            .await?;

        Ok(call)
    }

    /// Equivalent to `transfer_call(current_agent -> by_agent)`.
    pub async fn recall_phone(&self, call_id: Uuid, by_agent: &str) -> Result<Call> {
        let current = self
            .get_call(call_id)
            .ok_or_else(|| GatewayError::not_found(format!("call {call_id}")))?
            .current_agent_id
            .ok_or_else(|| GatewayError::invalid_state("call has no current handler to recall from"))?;
        self.transfer_call(call_id, &current, by_agent, None).await
    }
}

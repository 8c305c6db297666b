//! Direct agent-queue messages (`<agent_id>_queue`). These are distinct
//! from the frontend `Notification` envelope: agent messages are a grab bag
//! of instructions (`incoming_call`, `call_answered`, `call_transferred`,
//! `voice_failure`, reminder `system_alert`s, ...) published straight onto
//! an agent's queue rather than through the notification tagged union
//! meant for UI consumption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub message_type: String,
    pub session_id: Option<String>,
    pub call_id: Option<Uuid>,
    pub ts: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl AgentMessage {
    pub fn new(message_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            message_type: message_type.into(),
            session_id: None,
            call_id: None,
            ts: Utc::now(),
            payload,
        }
    }

    pub fn with_call(mut self, call_id: Uuid, session_id: impl Into<String>) -> Self {
        self.call_id = Some(call_id);
        self.session_id = Some(session_id.into());
        self
    }
}

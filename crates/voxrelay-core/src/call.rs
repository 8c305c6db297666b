//! The Call aggregate: the authoritative shape persisted and mutated by the
//! call manager's state machine (see `voxrelay-gateway::orchestrator`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Who or what may currently hold a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    RingingOutbound,
    RingingInbound,
    Connected,
    OnHold,
    Transferring,
    Ended,
}

impl CallStatus {
    pub fn is_ringing(&self) -> bool {
        matches!(self, CallStatus::RingingOutbound | CallStatus::RingingInbound)
    }

    pub fn is_ended(&self) -> bool {
        matches!(self, CallStatus::Ended)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEndReason {
    UserHangup,
    AgentHangup,
    UserDeclined,
    AgentDeclined,
    TransferComplete,
    Timeout,
    Error,
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallSource {
    Web,
    TwilioInbound,
    TwilioOutbound,
}

/// `"user"` or an agent id. Kept as a string rather than an enum so new
/// agent ids never require a code change here.
pub type ParticipantId = String;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    pub call_id: Uuid,
    pub session_id: String,
    pub initiated_by: ParticipantId,
    pub initial_target: ParticipantId,
    pub current_agent_id: Option<ParticipantId>,
    pub status: CallStatus,
    pub started_at: DateTime<Utc>,
    pub ringing_at: Option<DateTime<Utc>>,
    pub connected_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub end_reason: Option<CallEndReason>,
    pub ended_by: Option<ParticipantId>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub twilio_call_sid: Option<String>,
    pub caller_phone_number: Option<String>,
    pub call_source: Option<CallSource>,
}

impl Call {
    /// Duration the call spent connected, if it ever connected and ended.
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.connected_at, self.ended_at) {
            (Some(c), Some(e)) => Some(e - c),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Receiver,
    Transferred,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallParticipant {
    pub call_id: Uuid,
    pub agent_id: ParticipantId,
    pub role: ParticipantRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub transferred_from: Option<ParticipantId>,
}

/// Append-only audit entry. Never mutated after insertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEvent {
    pub call_id: Uuid,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub triggered_by: ParticipantId,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerType {
    User,
    Agent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTranscript {
    pub call_id: Uuid,
    pub speaker_type: SpeakerType,
    pub speaker_id: Option<ParticipantId>,
    pub content: String,
    pub audio_file_path: Option<String>,
    pub audio_duration_ms: Option<i64>,
    pub stt_confidence: Option<f32>,
    pub ts: DateTime<Utc>,
}

/// A single row of `conversation_messages`; backs conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub session_id: String,
    pub role: SpeakerType,
    pub content: String,
    pub input_mode: String,
    pub created_at: DateTime<Utc>,
}

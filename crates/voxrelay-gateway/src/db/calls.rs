//! `calls`, `call_participants`, and `call_events` persistence.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;
use voxrelay_core::{
    Call, CallEndReason, CallEvent, CallParticipant, CallSource, CallStatus, ParticipantRole,
};

use crate::error::{GatewayError, Result};

pub(crate) fn status_to_str(s: &CallStatus) -> &'static str {
    match s {
        CallStatus::RingingOutbound => "ringing_outbound",
        CallStatus::RingingInbound => "ringing_inbound",
        CallStatus::Connected => "connected",
        CallStatus::OnHold => "on_hold",
        CallStatus::Transferring => "transferring",
        CallStatus::Ended => "ended",
    }
}

fn status_from_str(s: &str) -> Result<CallStatus> {
    Ok(match s {
        "ringing_outbound" => CallStatus::RingingOutbound,
        "ringing_inbound" => CallStatus::RingingInbound,
        "connected" => CallStatus::Connected,
        "on_hold" => CallStatus::OnHold,
        "transferring" => CallStatus::Transferring,
        "ended" => CallStatus::Ended,
        other => return Err(GatewayError::internal(format!("unknown call status in db: {other}"))),
    })
}

fn reason_to_str(r: &CallEndReason) -> &'static str {
    match r {
        CallEndReason::UserHangup => "user_hangup",
        CallEndReason::AgentHangup => "agent_hangup",
        CallEndReason::UserDeclined => "user_declined",
        CallEndReason::AgentDeclined => "agent_declined",
        CallEndReason::TransferComplete => "transfer_complete",
        CallEndReason::Timeout => "timeout",
        CallEndReason::Error => "error",
        CallEndReason::Disconnected => "disconnected",
    }
}

fn reason_from_str(s: &str) -> Result<CallEndReason> {
    Ok(match s {
        "user_hangup" => CallEndReason::UserHangup,
        "agent_hangup" => CallEndReason::AgentHangup,
        "user_declined" => CallEndReason::UserDeclined,
        "agent_declined" => CallEndReason::AgentDeclined,
        "transfer_complete" => CallEndReason::TransferComplete,
        "timeout" => CallEndReason::Timeout,
        "error" => CallEndReason::Error,
        "disconnected" => CallEndReason::Disconnected,
        other => return Err(GatewayError::internal(format!("unknown end reason in db: {other}"))),
    })
}

fn source_to_str(s: &CallSource) -> &'static str {
    match s {
        CallSource::Web => "web",
        CallSource::TwilioInbound => "twilio_inbound",
        CallSource::TwilioOutbound => "twilio_outbound",
    }
}

fn source_from_str(s: &str) -> Result<CallSource> {
    Ok(match s {
        "web" => CallSource::Web,
        "twilio_inbound" => CallSource::TwilioInbound,
        "twilio_outbound" => CallSource::TwilioOutbound,
        other => return Err(GatewayError::internal(format!("unknown call source in db: {other}"))),
    })
}

fn row_to_call(row: &sqlx::sqlite::SqliteRow) -> Result<Call> {
    let status: String = row.try_get("status")?;
    let end_reason: Option<String> = row.try_get("end_reason")?;
    let call_source: Option<String> = row.try_get("call_source")?;
    let metadata: String = row.try_get("metadata")?;

    Ok(Call {
        call_id: Uuid::parse_str(row.try_get("call_id")?).map_err(|e| GatewayError::internal(e.to_string()))?,
        session_id: row.try_get("session_id")?,
        initiated_by: row.try_get("initiated_by")?,
        initial_target: row.try_get("initial_target")?,
        current_agent_id: row.try_get("current_agent_id")?,
        status: status_from_str(&status)?,
        started_at: row.try_get::<DateTime<Utc>, _>("started_at")?,
        ringing_at: row.try_get("ringing_at")?,
        connected_at: row.try_get("connected_at")?,
        ended_at: row.try_get("ended_at")?,
        end_reason: end_reason.map(|r| reason_from_str(&r)).transpose()?,
        ended_by: row.try_get("ended_by")?,
        metadata: serde_json::from_str(&metadata).unwrap_or_default(),
        twilio_call_sid: row.try_get("twilio_call_sid")?,
        caller_phone_number: row.try_get("caller_phone_number")?,
        call_source: call_source.map(|s| source_from_str(&s)).transpose()?,
    })
}

pub async fn insert_call(pool: &SqlitePool, call: &Call) -> Result<()> {
    sqlx::query(
        "INSERT INTO calls (call_id, session_id, initiated_by, initial_target, current_agent_id, status, \
         started_at, ringing_at, connected_at, ended_at, end_reason, ended_by, metadata, twilio_call_sid, \
         caller_phone_number, call_source) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)",
    )
    .bind(call.call_id.to_string())
    .bind(&call.session_id)
    .bind(&call.initiated_by)
    .bind(&call.initial_target)
    .bind(&call.current_agent_id)
    .bind(status_to_str(&call.status))
    .bind(call.started_at)
    .bind(call.ringing_at)
    .bind(call.connected_at)
    .bind(call.ended_at)
    .bind(call.end_reason.as_ref().map(reason_to_str))
    .bind(&call.ended_by)
    .bind(serde_json::to_string(&call.metadata).unwrap_or_else(|_| "{}".to_string()))
    .bind(&call.twilio_call_sid)
    .bind(&call.caller_phone_number)
    .bind(call.call_source.as_ref().map(source_to_str))
    .execute(pool)
    .await?;
    Ok(())
}

/// Full-row upsert used by every call-manager state transition: the manager
/// holds the authoritative in-memory `Call` and persists it wholesale after
/// each operation rather than issuing narrower per-field updates.
pub async fn save_call(pool: &SqlitePool, call: &Call) -> Result<()> {
    sqlx::query(
        "UPDATE calls SET current_agent_id=?, status=?, ringing_at=?, connected_at=?, ended_at=?, \
         end_reason=?, ended_by=?, metadata=?, twilio_call_sid=? WHERE call_id=?",
    )
    .bind(&call.current_agent_id)
    .bind(status_to_str(&call.status))
    .bind(call.ringing_at)
    .bind(call.connected_at)
    .bind(call.ended_at)
    .bind(call.end_reason.as_ref().map(reason_to_str))
    .bind(&call.ended_by)
    .bind(serde_json::to_string(&call.metadata).unwrap_or_else(|_| "{}".to_string()))
    .bind(&call.twilio_call_sid)
    .bind(call.call_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_call(pool: &SqlitePool, call_id: Uuid) -> Result<Option<Call>> {
    let row = sqlx::query("SELECT * FROM calls WHERE call_id = ?")
        .bind(call_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_call).transpose()
}

pub async fn get_call_by_session(pool: &SqlitePool, session_id: &str) -> Result<Option<Call>> {
    let row = sqlx::query("SELECT * FROM calls WHERE session_id = ? AND status != 'ended' ORDER BY started_at DESC LIMIT 1")
        .bind(session_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_call).transpose()
}

/// Loads every non-terminal call, used to restore in-memory state on
/// startup.
pub async fn list_non_terminal_calls(pool: &SqlitePool) -> Result<Vec<Call>> {
    let rows = sqlx::query("SELECT * FROM calls WHERE status != 'ended'")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_call).collect()
}

pub async fn insert_participant(pool: &SqlitePool, p: &CallParticipant) -> Result<()> {
    sqlx::query(
        "INSERT INTO call_participants (call_id, agent_id, role, joined_at, left_at, transferred_from) \
         VALUES (?,?,?,?,?,?)",
    )
    .bind(p.call_id.to_string())
    .bind(&p.agent_id)
    .bind(match p.role {
        ParticipantRole::Receiver => "receiver",
        ParticipantRole::Transferred => "transferred",
    })
    .bind(p.joined_at)
    .bind(p.left_at)
    .bind(&p.transferred_from)
    .execute(pool)
    .await?;
    Ok(())
}

/// Closes the current handler's participant row (`left_at IS NULL`) for a
/// call. Invariant: at most one such row per call.
pub async fn close_current_participant(pool: &SqlitePool, call_id: Uuid, left_at: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE call_participants SET left_at = ? WHERE call_id = ? AND left_at IS NULL",
    )
    .bind(left_at)
    .bind(call_id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn insert_event(pool: &SqlitePool, e: &CallEvent) -> Result<()> {
    sqlx::query(
        "INSERT INTO call_events (call_id, event_type, event_data, triggered_by, ts) VALUES (?,?,?,?,?)",
    )
    .bind(e.call_id.to_string())
    .bind(&e.event_type)
    .bind(serde_json::to_string(&e.event_data).unwrap_or_else(|_| "null".to_string()))
    .bind(&e.triggered_by)
    .bind(e.ts)
    .execute(pool)
    .await?;
    Ok(())
}

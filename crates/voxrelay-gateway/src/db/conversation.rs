//! `conversation_messages` persistence: the text-channel history shown
//! alongside a session's call/notification activity.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;
use voxrelay_core::{ConversationMessage, SpeakerType};

use crate::error::{GatewayError, Result};

fn role_to_str(r: &SpeakerType) -> &'static str {
    match r {
        SpeakerType::User => "user",
        SpeakerType::Agent => "agent",
    }
}

fn role_from_str(s: &str) -> Result<SpeakerType> {
    Ok(match s {
        "user" => SpeakerType::User,
        "agent" => SpeakerType::Agent,
        other => return Err(GatewayError::internal(format!("unknown speaker role in db: {other}"))),
    })
}

pub async fn insert(pool: &SqlitePool, msg: &ConversationMessage) -> Result<()> {
    sqlx::query(
        "INSERT INTO conversation_messages (id, session_id, role, content, input_mode, created_at) \
         VALUES (?,?,?,?,?,?)",
    )
    .bind(msg.id.to_string())
    .bind(&msg.session_id)
    .bind(role_to_str(&msg.role))
    .bind(&msg.content)
    .bind(&msg.input_mode)
    .bind(msg.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn history(pool: &SqlitePool, session_id: &str, limit: i64) -> Result<Vec<ConversationMessage>> {
    let rows = sqlx::query(
        "SELECT * FROM conversation_messages WHERE session_id = ? ORDER BY created_at DESC LIMIT ?",
    )
    .bind(session_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut messages = rows
        .iter()
        .map(|row| {
            Ok(ConversationMessage {
                id: Uuid::parse_str(row.try_get("id")?).map_err(|e| GatewayError::internal(e.to_string()))?,
                session_id: row.try_get("session_id")?,
                role: role_from_str(&row.try_get::<String, _>("role")?)?,
                content: row.try_get("content")?,
                input_mode: row.try_get("input_mode")?,
                created_at: row.try_get("created_at")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    messages.reverse();
    Ok(messages)
}

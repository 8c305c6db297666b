//! `pending_notifications` persistence.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use uuid::Uuid;
use voxrelay_core::PendingNotification;

use crate::error::Result;

fn row_to_pending(row: &sqlx::sqlite::SqliteRow) -> Result<PendingNotification> {
    let payload: String = row.try_get("notification_payload")?;
    Ok(PendingNotification {
        id: Uuid::parse_str(row.try_get("id")?).unwrap_or_else(|_| Uuid::new_v4()),
        session_id: row.try_get("session_id")?,
        notification_id: Uuid::parse_str(row.try_get("notification_id")?).unwrap_or_else(|_| Uuid::new_v4()),
        notification_type: row.try_get("notification_type")?,
        notification_payload: serde_json::from_str(&payload).unwrap_or(serde_json::Value::Null),
        created_at: row.try_get("created_at")?,
        delivered_at: row.try_get("delivered_at")?,
        delivery_attempts: row.try_get("delivery_attempts")?,
        last_attempt_at: row.try_get("last_attempt_at")?,
    })
}

/// Inserts a pending row, doing nothing on a `notification_id` conflict.
/// This is what makes concurrent misses from multiple gateway instances
/// idempotent.
pub async fn upsert(pool: &SqlitePool, pending: &PendingNotification) -> Result<()> {
    sqlx::query(
        "INSERT INTO pending_notifications \
         (id, session_id, notification_id, notification_type, notification_payload, created_at, \
          delivered_at, delivery_attempts, last_attempt_at) \
         VALUES (?,?,?,?,?,?,?,?,?) \
         ON CONFLICT(notification_id) DO NOTHING",
    )
    .bind(pending.id.to_string())
    .bind(&pending.session_id)
    .bind(pending.notification_id.to_string())
    .bind(&pending.notification_type)
    .bind(serde_json::to_string(&pending.notification_payload).unwrap_or_else(|_| "null".to_string()))
    .bind(pending.created_at)
    .bind(pending.delivered_at)
    .bind(pending.delivery_attempts)
    .bind(pending.last_attempt_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Rows for `session_id` not yet delivered, oldest first, replayed when
/// that session's socket reconnects.
pub async fn undelivered_for_session(pool: &SqlitePool, session_id: &str) -> Result<Vec<PendingNotification>> {
    let rows = sqlx::query(
        "SELECT * FROM pending_notifications WHERE session_id = ? AND delivered_at IS NULL ORDER BY created_at ASC",
    )
    .bind(session_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_pending).collect()
}

pub async fn mark_delivered(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("UPDATE pending_notifications SET delivered_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn record_attempt_failure(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query(
        "UPDATE pending_notifications SET delivery_attempts = delivery_attempts + 1, last_attempt_at = ? WHERE id = ?",
    )
    .bind(Utc::now())
    .bind(id.to_string())
    .execute(pool)
    .await?;
    Ok(())
}

/// Hourly sweep: removes delivered rows older than `retention`.
pub async fn sweep_delivered_older_than(pool: &SqlitePool, retention: chrono::Duration) -> Result<u64> {
    let cutoff = Utc::now() - retention;
    let result = sqlx::query(
        "DELETE FROM pending_notifications WHERE delivered_at IS NOT NULL AND delivered_at < ?",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

//! Read access to the `reminders`/`calendar_events` tables the gateway's
//! migrations own. The scheduler only reads and, for standalone
//! non-recurring reminders, hard-deletes; it never creates rows, mirroring
//! `scheduler_service/app/database.py`.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use uuid::Uuid;
use voxrelay_core::{CalendarEvent, Reminder};

use crate::error::Result;

pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    Ok(SqlitePoolOptions::new().max_connections(5).connect(database_url).await?)
}

fn parse_string_list(raw: &str) -> Vec<String> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_timestamp_list(raw: &str) -> Vec<DateTime<Utc>> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn parse_int_list(raw: &str) -> Vec<i64> {
    serde_json::from_str(raw).unwrap_or_default()
}

fn row_to_reminder(row: &sqlx::sqlite::SqliteRow) -> sqlx::Result<Reminder> {
    let id: String = row.try_get("id")?;
    let exception_dates: String = row.try_get("exception_dates")?;
    let target_agents: String = row.try_get("target_agents")?;
    Ok(Reminder {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        trigger_time: row.try_get("trigger_time")?,
        recurrence_rule: row.try_get("recurrence_rule")?,
        exception_dates: parse_timestamp_list(&exception_dates),
        target_agents: parse_string_list(&target_agents),
        created_by: row.try_get("created_by")?,
    })
}

/// Source 1: non-recurring reminders whose trigger time has passed.
pub async fn due_standalone_reminders(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<Reminder>> {
    let rows = sqlx::query(
        "SELECT id, title, description, trigger_time, recurrence_rule, exception_dates, target_agents, created_by \
         FROM reminders WHERE recurrence_rule IS NULL AND trigger_time <= ? ORDER BY trigger_time ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_reminder).collect::<sqlx::Result<Vec<_>>>()?)
}

/// Source 2: all recurring standalone reminders, expanded by the caller.
pub async fn recurring_reminders(pool: &SqlitePool) -> Result<Vec<Reminder>> {
    let rows = sqlx::query(
        "SELECT id, title, description, trigger_time, recurrence_rule, exception_dates, target_agents, created_by \
         FROM reminders WHERE recurrence_rule IS NOT NULL ORDER BY trigger_time ASC",
    )
    .fetch_all(pool)
    .await?;
    Ok(rows.iter().map(row_to_reminder).collect::<sqlx::Result<Vec<_>>>()?)
}

pub async fn delete_reminder(pool: &SqlitePool, id: Uuid) -> Result<()> {
    sqlx::query("DELETE FROM reminders WHERE id = ?")
        .bind(id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Source 3: events with non-empty `auto_reminders`, whose start (or
/// next 24h of recurring instances) could produce a reminder soon.
pub async fn events_with_auto_reminders(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Vec<CalendarEvent>> {
    let window_end = now + chrono::Duration::hours(24);
    let rows = sqlx::query(
        "SELECT id, title, start_time, end_time, recurrence_rule, exception_dates, auto_reminders \
         FROM calendar_events \
         WHERE auto_reminders != '[]' \
           AND ( \
             (recurrence_rule IS NULL AND start_time >= ? AND start_time <= ?) \
             OR (recurrence_rule IS NOT NULL AND start_time <= ?) \
           ) \
         ORDER BY start_time ASC",
    )
    .bind(now)
    .bind(window_end)
    .bind(window_end)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let id: String = row.try_get("id")?;
            let exception_dates: String = row.try_get("exception_dates")?;
            let auto_reminders: String = row.try_get("auto_reminders")?;
            Ok(CalendarEvent {
                id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
                title: row.try_get("title")?,
                start_time: row.try_get("start_time")?,
                end_time: row.try_get("end_time")?,
                recurrence_rule: row.try_get("recurrence_rule")?,
                exception_dates: parse_timestamp_list(&exception_dates),
                auto_reminders: parse_int_list(&auto_reminders),
            })
        })
        .collect::<sqlx::Result<Vec<_>>>()
        .map_err(Into::into)
}

//! Integration tests for the scheduler's three reminder-source queries
//!, run against an in-memory SQLite pool shaped like the gateway's
//! `reminders`/`calendar_events` tables. The scheduler never migrates this
//! schema itself, so the test recreates it directly rather than pulling in
//! the gateway crate.

use chrono::{Duration, Utc};
use serial_test::serial;
use sqlx::sqlite::SqlitePoolOptions;
use uuid::Uuid;
use voxrelay_scheduler::db;

async fn test_pool() -> sqlx::SqlitePool {
    let pool = SqlitePoolOptions::new().connect("sqlite::memory:").await.unwrap();
    sqlx::query(
        "CREATE TABLE reminders (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            trigger_time TEXT NOT NULL,
            recurrence_rule TEXT,
            exception_dates TEXT NOT NULL DEFAULT '[]',
            target_agents TEXT NOT NULL DEFAULT '[]',
            created_by TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    sqlx::query(
        "CREATE TABLE calendar_events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            recurrence_rule TEXT,
            exception_dates TEXT NOT NULL DEFAULT '[]',
            auto_reminders TEXT NOT NULL DEFAULT '[]'
        )",
    )
    .execute(&pool)
    .await
    .unwrap();
    pool
}

async fn insert_standalone_reminder(pool: &sqlx::SqlitePool, trigger_time: chrono::DateTime<Utc>) -> Uuid {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO reminders (id, title, description, trigger_time, recurrence_rule, exception_dates, target_agents, created_by) \
         VALUES (?, 'take medicine', NULL, ?, NULL, '[]', '[]', 'user-1')",
    )
    .bind(id.to_string())
    .bind(trigger_time)
    .execute(pool)
    .await
    .unwrap();
    id
}

#[tokio::test]
#[serial]
async fn due_standalone_reminders_returns_only_past_non_recurring_rows() {
    let pool = test_pool().await;
    let now = Utc::now();
    insert_standalone_reminder(&pool, now - Duration::minutes(1)).await;
    insert_standalone_reminder(&pool, now + Duration::hours(1)).await; // not due yet

    let due = db::due_standalone_reminders(&pool, now).await.unwrap();
    assert_eq!(due.len(), 1);
    assert_eq!(due[0].title, "take medicine");
}

#[tokio::test]
#[serial]
async fn delete_reminder_removes_the_row() {
    let pool = test_pool().await;
    let id = insert_standalone_reminder(&pool, Utc::now()).await;
    db::delete_reminder(&pool, id).await.unwrap();
    let due = db::due_standalone_reminders(&pool, Utc::now() + Duration::minutes(1)).await.unwrap();
    assert!(due.is_empty());
}

#[tokio::test]
#[serial]
async fn recurring_reminders_excludes_non_recurring_rows() {
    let pool = test_pool().await;
    insert_standalone_reminder(&pool, Utc::now()).await;
    sqlx::query(
        "INSERT INTO reminders (id, title, description, trigger_time, recurrence_rule, exception_dates, target_agents, created_by) \
         VALUES (?, 'daily standup', NULL, ?, 'FREQ=DAILY', '[]', '[\"agent-1\"]', 'user-1')",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(Utc::now())
    .execute(&pool)
    .await
    .unwrap();

    let recurring = db::recurring_reminders(&pool).await.unwrap();
    assert_eq!(recurring.len(), 1);
    assert_eq!(recurring[0].title, "daily standup");
    assert_eq!(recurring[0].target_agents, vec!["agent-1".to_string()]);
}

#[tokio::test]
#[serial]
async fn events_with_auto_reminders_skips_events_with_no_reminders_configured() {
    let pool = test_pool().await;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO calendar_events (id, title, start_time, end_time, recurrence_rule, exception_dates, auto_reminders) \
         VALUES (?, 'no reminders', ?, ?, NULL, '[]', '[]')",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(now + Duration::minutes(30))
    .bind(now + Duration::hours(1))
    .execute(&pool)
    .await
    .unwrap();

    sqlx::query(
        "INSERT INTO calendar_events (id, title, start_time, end_time, recurrence_rule, exception_dates, auto_reminders) \
         VALUES (?, 'standup', ?, ?, NULL, '[]', '[10]')",
    )
    .bind(Uuid::new_v4().to_string())
    .bind(now + Duration::minutes(30))
    .bind(now + Duration::hours(1))
    .execute(&pool)
    .await
    .unwrap();

    let events = db::events_with_auto_reminders(&pool, now).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].title, "standup");
    assert_eq!(events[0].auto_reminders, vec![10]);
}

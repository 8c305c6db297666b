//! Poll loop: three reminder sources, each fired when due. Grounded
//! on `scheduler_service/app/main.py`'s `check_due_reminders`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};
use voxrelay_core::AgentMessage;

use crate::config::SchedulerConfig;
use crate::gateway_client::GatewayClient;
use crate::recurrence::{expand_event_instances, expand_reminder_instances};
use crate::{db, error::Result};

/// Occurrences within this trailing window of "now" count as due; matches
/// the original's `0 <= time_diff <= 30` check against the poll cadence.
const DUE_WINDOW: Duration = Duration::seconds(30);

/// Event-attached reminders have no per-event agent selection in the
/// original either; they always go to the primary orchestrator queue.
const EVENT_REMINDER_AGENT: &str = "primary_agent";

pub struct SchedulerService {
    config: SchedulerConfig,
    pool: sqlx::sqlite::SqlitePool,
    gateway: GatewayClient,
    shutdown: Arc<AtomicBool>,
}

impl SchedulerService {
    pub fn new(config: SchedulerConfig, pool: sqlx::sqlite::SqlitePool, shutdown: Arc<AtomicBool>) -> Self {
        let gateway = GatewayClient::new(&config);
        Self { config, pool, gateway, shutdown }
    }

    pub async fn run(&self) {
        info!(interval_secs = self.config.check_interval_secs, "scheduler started");
        while !self.shutdown.load(Ordering::SeqCst) {
            if let Err(err) = self.check_due_reminders().await {
                warn!(error = %err, "error checking reminders, retrying next tick");
            }
            tokio::time::sleep(std::time::Duration::from_secs(self.config.check_interval_secs)).await;
        }
        info!("scheduler stopped gracefully");
    }

    async fn check_due_reminders(&self) -> Result<()> {
        let now = Utc::now();
        let mut triggered = 0usize;

        triggered += self.process_standalone_reminders(now).await?;
        triggered += self.process_recurring_reminders(now).await?;
        triggered += self.process_event_reminders(now).await?;

        if triggered > 0 {
            info!(triggered, "reminders fired this tick");
        }
        Ok(())
    }

    async fn process_standalone_reminders(&self, now: chrono::DateTime<Utc>) -> Result<usize> {
        let due = db::due_standalone_reminders(&self.pool, now).await?;
        let mut fired = 0;
        for reminder in &due {
            self.emit_reminder(reminder, reminder.trigger_time, "standalone").await;
            if let Err(err) = db::delete_reminder(&self.pool, reminder.id).await {
                warn!(reminder_id = %reminder.id, error = %err, "failed to delete fired reminder");
            }
            fired += 1;
        }
        Ok(fired)
    }

    async fn process_recurring_reminders(&self, now: chrono::DateTime<Utc>) -> Result<usize> {
        let recurring = db::recurring_reminders(&self.pool).await?;
        let mut fired = 0;
        for reminder in &recurring {
            let Some(rule) = &reminder.recurrence_rule else { continue };
            let instances = expand_reminder_instances(reminder.trigger_time, rule, &reminder.exception_dates);
            for instance in instances {
                let age = now - instance;
                if age >= Duration::zero() && age <= DUE_WINDOW {
                    self.emit_reminder(reminder, instance, "standalone_recurring").await;
                    fired += 1;
                }
            }
        }
        Ok(fired)
    }

    async fn process_event_reminders(&self, now: chrono::DateTime<Utc>) -> Result<usize> {
        let events = db::events_with_auto_reminders(&self.pool, now).await?;
        let mut fired = 0;
        for event in &events {
            let occurrences = if let Some(rule) = &event.recurrence_rule {
                expand_event_instances(event.start_time, event.end_time, rule, &event.exception_dates)
            } else {
                vec![(event.start_time, event.end_time)]
            };

            for (start, _end) in occurrences {
                for minutes_before in &event.auto_reminders {
                    let reminder_time = start - Duration::minutes(*minutes_before);
                    let age = now - reminder_time;
                    if age >= Duration::zero() && age <= DUE_WINDOW {
                        self.emit_event_reminder(event, start, *minutes_before, reminder_time).await;
                        fired += 1;
                    }
                }
            }
        }
        Ok(fired)
    }

    async fn emit_reminder(
        &self,
        reminder: &voxrelay_core::Reminder,
        trigger_time: chrono::DateTime<Utc>,
        source: &str,
    ) {
        let targets = if reminder.target_agents.is_empty() {
            vec!["primary_agent".to_string()]
        } else {
            reminder.target_agents.clone()
        };

        for agent in &targets {
            let message = AgentMessage::new(
                "system_alert",
                serde_json::json!({
                    "alert_type": "REMINDER",
                    "reminder_id": reminder.id,
                    "title": reminder.title,
                    "description": reminder.description,
                    "trigger_time": trigger_time,
                    "type": source,
                }),
            );
            if let Err(err) = self.gateway.send_agent_message(agent, message).await {
                warn!(agent, reminder_id = %reminder.id, error = %err, "failed to deliver reminder to agent queue");
            }
        }

        let detail = serde_json::json!({
            "reminder": {
                "id": reminder.id,
                "title": reminder.title,
                "description": reminder.description,
                "trigger_time": trigger_time,
                "event_id": null,
                "event_title": null,
                "recurrence_rule": reminder.recurrence_rule,
                "target_agents": targets,
            }
        });
        if let Err(err) = self.gateway.publish_reminder_triggered(detail).await {
            warn!(reminder_id = %reminder.id, error = %err, "failed to publish reminder_triggered");
        }

        info!(reminder_id = %reminder.id, title = %reminder.title, source, "reminder triggered");
    }

    async fn emit_event_reminder(
        &self,
        event: &voxrelay_core::CalendarEvent,
        occurrence_start: chrono::DateTime<Utc>,
        minutes_before: i64,
        reminder_time: chrono::DateTime<Utc>,
    ) {
        let message = AgentMessage::new(
            "system_alert",
            serde_json::json!({
                "alert_type": "REMINDER",
                "event_id": event.id,
                "event_title": event.title,
                "title": format!("Reminder: {}", event.title),
                "description": format!("{minutes_before} minutes before event"),
                "event_start_time": occurrence_start,
                "trigger_time": reminder_time,
                "type": "event_attached",
            }),
        );
        if let Err(err) = self.gateway.send_agent_message(EVENT_REMINDER_AGENT, message).await {
            warn!(event_id = %event.id, error = %err, "failed to deliver event reminder to agent queue");
        }

        let detail = serde_json::json!({
            "reminder": {
                "id": format!("event_{}_{}min", event.id, minutes_before),
                "title": format!("Reminder: {}", event.title),
                "description": format!("{minutes_before} minutes before event"),
                "trigger_time": reminder_time,
                "event_id": event.id,
                "event_title": event.title,
                "recurrence_rule": event.recurrence_rule,
                "target_agents": ["primary_agent"],
            }
        });
        if let Err(err) = self.gateway.publish_reminder_triggered(detail).await {
            warn!(event_id = %event.id, error = %err, "failed to publish event reminder_triggered");
        }

        info!(event_id = %event.id, title = %event.title, minutes_before, "event reminder triggered");
    }
}

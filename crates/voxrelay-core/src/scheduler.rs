//! Data shapes consumed by the scheduler's recurrence expansion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub trigger_time: DateTime<Utc>,
    pub recurrence_rule: Option<String>,
    pub exception_dates: Vec<DateTime<Utc>>,
    pub target_agents: Vec<String>,
    pub created_by: String,
}

impl Reminder {
    pub fn is_recurring(&self) -> bool {
        self.recurrence_rule.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: Uuid,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub recurrence_rule: Option<String>,
    pub exception_dates: Vec<DateTime<Utc>>,
    /// Minutes-before-start offsets; a non-empty list is what makes this
    /// event a source of its own derived reminders.
    pub auto_reminders: Vec<i64>,
}

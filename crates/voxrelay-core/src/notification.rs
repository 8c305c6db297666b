//! The notification envelope and its tagged-union payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One variant per `notification_type`. `#[serde(flatten)]` on the owning
/// `Notification` puts `notification_type`/`payload` at the top level of
/// the wire envelope rather than nested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "notification_type", content = "payload", rename_all = "snake_case")]
pub enum NotificationPayload {
    NewMessage {
        content: String,
        role: String,
    },
    TimerAlert {
        reminder_id: Uuid,
        title: String,
    },
    AgentStatus {
        agent_id: String,
        status: String,
    },
    AgentActionStatus {
        agent_id: String,
        action: String,
        status: String,
        detail: Option<serde_json::Value>,
    },
    AppInteraction {
        app_id: String,
        interaction: String,
        detail: Option<serde_json::Value>,
    },
    SystemAlert {
        message: String,
        severity: String,
    },
    BrowserScreenshot {
        session_id: String,
        image_url: String,
    },
    /// Forward-compatible catch-all: the transport layer must tolerate
    /// variants it doesn't yet know about. Producer/consumer boundaries
    /// that need a typed payload still match on the named variants above
    /// and treat `Unknown` as an error.
    #[serde(other)]
    Unknown,
}

impl NotificationPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            NotificationPayload::NewMessage { .. } => "new_message",
            NotificationPayload::TimerAlert { .. } => "timer_alert",
            NotificationPayload::AgentStatus { .. } => "agent_status",
            NotificationPayload::AgentActionStatus { .. } => "agent_action_status",
            NotificationPayload::AppInteraction { .. } => "app_interaction",
            NotificationPayload::SystemAlert { .. } => "system_alert",
            NotificationPayload::BrowserScreenshot { .. } => "browser_screenshot",
            NotificationPayload::Unknown => "unknown",
        }
    }
}

/// A notification with `session_id = None` is a broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub notification_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub recipient_agent_id: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub source: String,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

impl Notification {
    pub fn new(source: impl Into<String>, session_id: Option<String>, payload: NotificationPayload) -> Self {
        Self {
            notification_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            recipient_agent_id: None,
            session_id,
            user_id: None,
            source: source.into(),
            payload,
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.session_id.is_none()
    }
}

/// The durable shadow of a `Notification` that could not be delivered live
///. `notification_id` is the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingNotification {
    pub id: Uuid,
    pub session_id: String,
    pub notification_id: Uuid,
    pub notification_type: String,
    pub notification_payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub delivery_attempts: i32,
    pub last_attempt_at: Option<DateTime<Utc>>,
}

impl PendingNotification {
    pub fn from_notification(n: &Notification) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: n
                .session_id
                .clone()
                .expect("pending notifications are only created for session-scoped notifications"),
            notification_id: n.notification_id,
            notification_type: n.payload.type_name().to_string(),
            notification_payload: serde_json::to_value(&n.payload).unwrap_or(serde_json::Value::Null),
            created_at: n.timestamp,
            delivered_at: None,
            delivery_attempts: 0,
            last_attempt_at: None,
        }
    }
}

//! Client for the gateway's agent-queue and notification endpoints — the
//! two sinks every reminder emission writes to.

use voxrelay_core::AgentMessage;

use crate::config::SchedulerConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl GatewayClient {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.gateway_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    pub async fn send_agent_message(&self, agent_id: &str, message: AgentMessage) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/agents/{agent_id}/message", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    /// Publishes `reminder_triggered` so the reminders UI refreshes, the
    /// generalized form of the original's `send_app_interaction`.
    pub async fn publish_reminder_triggered(&self, detail: serde_json::Value) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/notifications/app-interaction", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({
                "session_id": null,
                "app_id": "reminders_app",
                "interaction": "reminder_triggered",
                "detail": detail,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

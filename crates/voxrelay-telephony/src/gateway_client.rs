//! REST client for the gateway's call-management and internal endpoints.

use uuid::Uuid;
use voxrelay_core::{AgentMessage, Call, CallEndReason, CallSource, Notification};

use crate::config::TelephonyConfig;
use crate::error::Result;

#[derive(Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    internal_api_key: String,
}

impl GatewayClient {
    pub fn new(config: &TelephonyConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.gateway_base_url.clone(),
            internal_api_key: config.internal_api_key.clone(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn register_phone_call(
        &self,
        call_id: Uuid,
        session_id: &str,
        target_agent: &str,
        carrier_call_sid: &str,
        caller_phone_number: Option<String>,
        call_source: CallSource,
    ) -> Result<Call> {
        let call = self
            .http
            .post(format!("{}/api/v1/calls/internal/register-phone-call", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({
                "call_id": call_id,
                "session_id": session_id,
                "target_agent": target_agent,
                "carrier_call_sid": carrier_call_sid,
                "caller_phone_number": caller_phone_number,
                "call_source": call_source,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(call)
    }

    pub async fn answer_call(&self, call_id: Uuid, answered_by: &str) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/calls/{call_id}/answer", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({ "answered_by": answered_by }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn end_call(&self, call_id: Uuid, reason: CallEndReason) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/calls/{call_id}/end", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(&serde_json::json!({ "ended_by": "system", "reason": reason }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
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

    pub async fn publish_notification(&self, notification: &Notification) -> Result<()> {
        self.http
            .post(format!("{}/api/v1/notifications", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .json(notification)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    pub async fn get_call_by_session(&self, session_id: &str) -> Result<Option<Call>> {
        let resp = self
            .http
            .get(format!("{}/api/v1/sessions/{session_id}/call", self.base_url))
            .header("x-internal-api-key", &self.internal_api_key)
            .send()
            .await?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(resp.error_for_status()?.json().await?))
    }
}

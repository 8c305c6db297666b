//! Twilio webhook endpoints: incoming/outbound voice TwiML and the
//! call-status callback. Grounded on `webhooks.py`.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;
use voxrelay_core::CallEndReason;

use crate::auth::verify_carrier_signature;
use crate::error::{Result, TelephonyError};
use crate::state::AppState;

fn redact_phone(number: &str) -> String {
    if number.len() > 6 {
        format!("{}****{}", &number[..4], &number[number.len() - 2..])
    } else {
        "***".to_string()
    }
}

fn verify_signature(state: &AppState, headers: &HeaderMap, path: &str, form: &BTreeMap<String, String>) -> Result<()> {
    if state.config.skip_signature_validation {
        warn!("carrier signature validation disabled — do not use in production");
        return Ok(());
    }
    let signature = headers
        .get("x-twilio-signature")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let url = format!("{}{}", state.config.webhook_base_url.trim_end_matches('/'), path);
    if verify_carrier_signature(&state.config.carrier_auth_token, &url, form, signature) {
        Ok(())
    } else {
        Err(TelephonyError::unauthorized("invalid carrier request signature"))
    }
}

fn twiml(body: String) -> Response {
    (
        [("content-type", "application/xml")],
        format!(r#"<?xml version="1.0" encoding="UTF-8"?><Response>{body}</Response>"#),
    )
        .into_response()
}

#[derive(Deserialize)]
pub struct IncomingVoiceForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "To")]
    to: String,
    #[serde(rename = "CallStatus")]
    call_status: String,
    #[serde(rename = "CallerName")]
    caller_name: Option<String>,
}

pub async fn incoming_voice(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<IncomingVoiceForm>,
) -> Result<Response> {
    let mut fields = BTreeMap::new();
    fields.insert("CallSid".to_string(), form.call_sid.clone());
    fields.insert("From".to_string(), form.from.clone());
    fields.insert("To".to_string(), form.to.clone());
    fields.insert("CallStatus".to_string(), form.call_status.clone());
    if let Some(name) = &form.caller_name {
        fields.insert("CallerName".to_string(), name.clone());
    }
    verify_signature(&state, &headers, "/voice/incoming", &fields)?;

    info!(
        call_sid = %form.call_sid, from = %redact_phone(&form.from), to = %form.to,
        "incoming call",
    );

    if state.at_capacity() {
        warn!("rejecting call: max concurrent calls reached");
        return Ok(twiml(
            r#"<Say>We're experiencing high call volume. Please try again later.</Say><Hangup/>"#.to_string(),
        ));
    }

    if !crate::db::is_phone_number_allowed(&state.pool, &form.from).await? {
        warn!(from = %redact_phone(&form.from), "rejecting call from non-whitelisted number");
        return Ok(twiml(r#"<Reject reason="rejected"/>"#.to_string()));
    }

    let caller_info = crate::db::get_allowed_number_info(&state.pool, &form.from).await?;
    let caller_name = caller_info
        .and_then(|i| i.label)
        .or(form.caller_name)
        .unwrap_or_else(|| "Unknown".to_string());

    let session_id = format!("twilio_{}", form.call_sid);
    let call_id = Uuid::new_v4();
    let ws_host = state
        .config
        .webhook_base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let stream_url = format!("wss://{ws_host}/media-stream/{session_id}");

    info!(session_id = %session_id, call_id = %call_id, "accepted incoming call");

    Ok(twiml(format!(
        r#"<Say>Connecting you now. Please wait.</Say><Connect><Stream url="{stream_url}">
            <Parameter name="session_id" value="{session_id}"/>
            <Parameter name="call_id" value="{call_id}"/>
            <Parameter name="twilio_call_sid" value="{call_sid}"/>
            <Parameter name="caller_phone_number" value="{from}"/>
            <Parameter name="caller_name" value="{caller_name}"/>
        </Stream></Connect>"#,
        call_sid = form.call_sid,
        from = form.from,
    )))
}

#[derive(Deserialize)]
pub struct OutboundAnswerQuery {
    session_id: Option<String>,
    call_id: Option<String>,
}

#[derive(Deserialize)]
pub struct OutboundAnswerForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
}

pub async fn outbound_answer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(q): Query<OutboundAnswerQuery>,
    Form(form): Form<OutboundAnswerForm>,
) -> Result<Response> {
    let mut fields = BTreeMap::new();
    fields.insert("CallSid".to_string(), form.call_sid.clone());
    verify_signature(&state, &headers, "/voice/outbound", &fields)?;

    let session_id = q.session_id.unwrap_or_else(|| format!("twilio_out_{}", form.call_sid));
    let call_id = q.call_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let ws_host = state
        .config
        .webhook_base_url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let stream_url = format!("wss://{ws_host}/media-stream/{session_id}");

    info!(session_id = %session_id, call_sid = %form.call_sid, "outbound call answered");

    Ok(twiml(format!(
        r#"<Say>Please hold while we connect your call.</Say><Connect><Stream url="{stream_url}">
            <Parameter name="session_id" value="{session_id}"/>
            <Parameter name="call_id" value="{call_id}"/>
            <Parameter name="twilio_call_sid" value="{call_sid}"/>
            <Parameter name="direction" value="outbound"/>
        </Stream></Connect>"#,
        call_sid = form.call_sid,
    )))
}

#[derive(Deserialize)]
pub struct StatusCallbackForm {
    #[serde(rename = "CallSid")]
    call_sid: String,
    #[serde(rename = "CallStatus")]
    call_status: String,
}

/// Carrier status → internal end reason. `in-progress` is handled
/// by the media-stream handler instead, since by the time a status callback
/// fires the stream is usually already live.
fn end_reason_for_status(status: &str) -> Option<CallEndReason> {
    match status {
        "completed" => Some(CallEndReason::UserHangup),
        "busy" | "no-answer" => Some(CallEndReason::Disconnected),
        "failed" | "canceled" => Some(CallEndReason::Error),
        _ => None,
    }
}

pub async fn status_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<StatusCallbackForm>,
) -> Result<&'static str> {
    let mut fields = BTreeMap::new();
    fields.insert("CallSid".to_string(), form.call_sid.clone());
    fields.insert("CallStatus".to_string(), form.call_status.clone());
    verify_signature(&state, &headers, "/voice/status", &fields)?;

    info!(call_sid = %form.call_sid, status = %form.call_status, "call status update");

    if let Some(reason) = end_reason_for_status(&form.call_status) {
        if let Some(stream) = state.streams.get(&form.call_sid).map(|s| Arc::clone(&s)) {
            if let Err(err) = state.gateway.end_call(stream.call_id, reason).await {
                warn!(call_sid = %form.call_sid, error = %err, "failed to notify gateway of call end");
            }
        }
    }

    Ok("received")
}

#[derive(Deserialize)]
pub struct IncomingSmsForm {
    #[serde(rename = "From")]
    from: String,
    #[serde(rename = "Body")]
    body: String,
}

pub async fn incoming_sms(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<IncomingSmsForm>,
) -> Result<&'static str> {
    let mut fields = BTreeMap::new();
    fields.insert("From".to_string(), form.from.clone());
    fields.insert("Body".to_string(), form.body.clone());
    verify_signature(&state, &headers, "/sms/incoming", &fields)?;

    if !crate::db::is_phone_number_allowed(&state.pool, &form.from).await? {
        warn!(from = %redact_phone(&form.from), "rejecting SMS from non-whitelisted number");
        return Ok("rejected");
    }

    let message = voxrelay_core::AgentMessage::new(
        "incoming_sms",
        serde_json::json!({ "from_phone_number": form.from, "body": form.body }),
    );
    if let Err(err) = state.gateway.send_agent_message(&state.config.primary_agent_id, message).await {
        warn!(error = %err, "failed to publish incoming_sms to primary agent queue");
    }

    Ok("received")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redact_phone_keeps_only_the_area_code_and_last_two_digits() {
        assert_eq!(redact_phone("+14155551234"), "+141****34");
        assert_eq!(redact_phone("123"), "***");
    }

    #[test]
    fn end_reason_for_status_maps_every_terminal_carrier_status() {
        assert_eq!(end_reason_for_status("completed"), Some(CallEndReason::UserHangup));
        assert_eq!(end_reason_for_status("busy"), Some(CallEndReason::Disconnected));
        assert_eq!(end_reason_for_status("no-answer"), Some(CallEndReason::Disconnected));
        assert_eq!(end_reason_for_status("failed"), Some(CallEndReason::Error));
        assert_eq!(end_reason_for_status("canceled"), Some(CallEndReason::Error));
        assert_eq!(end_reason_for_status("in-progress"), None);
        assert_eq!(end_reason_for_status("ringing"), None);
    }
}

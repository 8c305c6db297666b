//! Background sweep enforcing the ringing/hold/max-duration timeouts from
//!. Runs on a fixed interval rather than per-call timers so the
//! whole set of in-flight calls is rechecked from one place — the teacher's
//! `call-engine` uses the same fixed-interval sweep for queue timeouts
//! instead of scheduling one timer task per call.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};
use voxrelay_core::CallEndReason;

use super::call_manager::CallManager;

pub async fn run(manager: Arc<CallManager>, check_interval: Duration) {
    let mut ticker = tokio::time::interval(check_interval);
    loop {
        ticker.tick().await;
        let now = Utc::now();
        let overdue = manager.timed_out_calls(now);
        for call_id in overdue {
            match manager.end_call(call_id, "system", Some(CallEndReason::Timeout)).await {
                Ok(_) => info!(call_id = %call_id, "call ended by timeout monitor"),
                Err(err) => warn!(call_id = %call_id, error = %err, "timeout monitor failed to end call"),
            }
        }
    }
}

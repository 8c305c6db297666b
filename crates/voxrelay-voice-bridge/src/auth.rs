//! Internal API key check shared by this process's HTTP ingress. Mirrors
//! the gateway's constant-time comparison for the same shared-secret file.

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use crate::error::{BridgeError, Result};

pub fn require_internal_key(configured: &str, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| BridgeError::unauthorized("missing x-internal-api-key header"))?;
    if configured.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(BridgeError::unauthorized("invalid internal API key"))
    }
}

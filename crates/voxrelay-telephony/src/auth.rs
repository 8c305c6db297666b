//! Carrier request-signature validation and the internal API key check
//! shared by this process's own ingress. Grounded on
//! `webhooks.py::verify_twilio_signature`'s algorithm: sort the posted form
//! fields, concatenate them onto the request URL, and compare an
//! HMAC-SHA1/base64 digest against the carrier-supplied signature header.

use axum::http::HeaderMap;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use std::collections::BTreeMap;

use crate::error::{Result, TelephonyError};

type HmacSha1 = Hmac<Sha1>;

/// `url` must be exactly what the carrier signed, including scheme/host/path.
pub fn verify_carrier_signature(
    auth_token: &str,
    url: &str,
    form_fields: &BTreeMap<String, String>,
    presented_signature: &str,
) -> bool {
    let mut payload = url.to_string();
    for (key, value) in form_fields {
        payload.push_str(key);
        payload.push_str(value);
    }

    let Ok(mut mac) = HmacSha1::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(payload.as_bytes());
    let expected = BASE64.encode(mac.finalize().into_bytes());

    expected.as_bytes().ct_eq(presented_signature.as_bytes()).unwrap_u8() == 1
}

pub fn verify_internal_api_key(configured: &str, headers: &HeaderMap) -> Result<()> {
    let presented = headers
        .get("x-internal-api-key")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| TelephonyError::unauthorized("missing x-internal-api-key header"))?;
    if configured.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1 {
        Ok(())
    } else {
        Err(TelephonyError::unauthorized("invalid internal API key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_round_trips() {
        let mut fields = BTreeMap::new();
        fields.insert("CallSid".to_string(), "CA123".to_string());
        fields.insert("From".to_string(), "+15551234567".to_string());

        let mut mac = HmacSha1::new_from_slice(b"auth-token").unwrap();
        mac.update(b"https://example.test/voice/incomingCallSidCA123From+15551234567");
        let sig = BASE64.encode(mac.finalize().into_bytes());

        assert!(verify_carrier_signature(
            "auth-token",
            "https://example.test/voice/incoming",
            &fields,
            &sig
        ));
    }

    #[test]
    fn wrong_signature_rejected() {
        let fields = BTreeMap::new();
        assert!(!verify_carrier_signature("auth-token", "https://example.test/voice/incoming", &fields, "bogus"));
    }
}

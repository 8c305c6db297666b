//! Voice-session JWTs and HMAC-signed audio URLs.
//!
//! Signed audio links carry the file path and expiry in the query string
//! rather than the token itself: `sig = hex(HMAC-SHA256(secret,
//! "{file_path}:{expires_unix}"))`, verified in constant time via `subtle`.

use std::time::{SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{GatewayError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceTokenClaims {
    pub session_id: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub user_id: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// Mints a `voice_session` JWT (HS256) for `session_id`, valid for
/// `expiration_minutes`.
pub fn mint_voice_token(
    secret: &str,
    session_id: &str,
    user_id: Option<&str>,
    expiration_minutes: i64,
) -> Result<String> {
    let now = chrono::Utc::now();
    let claims = VoiceTokenClaims {
        session_id: session_id.to_string(),
        token_type: "voice_session".to_string(),
        user_id: user_id.map(|s| s.to_string()),
        iat: now.timestamp(),
        exp: (now + chrono::Duration::minutes(expiration_minutes)).timestamp(),
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|e| GatewayError::internal(format!("failed to mint voice token: {e}")))
}

/// Verifies a voice token and returns its claims. Rejects anything that
/// isn't a `voice_session` token, even if otherwise validly signed.
pub fn verify_voice_token(secret: &str, token: &str) -> Result<VoiceTokenClaims> {
    let data = decode::<VoiceTokenClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(jsonwebtoken::Algorithm::HS256),
    )
    .map_err(|e| GatewayError::unauthorized(format!("invalid voice token: {e}")))?;

    if data.claims.token_type != "voice_session" {
        return Err(GatewayError::unauthorized("token is not a voice_session token"));
    }

    Ok(data.claims)
}

type HmacSha256 = Hmac<Sha256>;

/// A freshly minted `/audio/signed/{sig}?file=&expires=` URL, split into its
/// parts so callers can build either a path or a full URL.
pub struct SignedAudioUrl {
    pub signature: String,
    pub file_path: String,
    pub expires_unix: i64,
}

impl SignedAudioUrl {
    pub fn to_path(&self) -> String {
        format!(
            "/audio/signed/{}?file={}&expires={}",
            self.signature, self.file_path, self.expires_unix
        )
    }
}

fn audio_signature(secret: &str, file_path: &str, expires_unix: i64) -> Result<Vec<u8>> {
    let message = format!("{file_path}:{expires_unix}");
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::internal(format!("invalid HMAC key: {e}")))?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes `signature = hex(HMAC-SHA256(secret, "{file_path}:{expires_unix}"))`
/// and returns the URL a client fetches the file through.
pub fn generate_audio_signed_url(secret: &str, file_path: &str, expires_in_secs: i64) -> Result<SignedAudioUrl> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    let expires_unix = now + expires_in_secs;
    let signature = hex::encode(audio_signature(secret, file_path, expires_unix)?);
    Ok(SignedAudioUrl { signature, file_path: file_path.to_string(), expires_unix })
}

/// Recomputes the HMAC over the `file`/`expires` query params and compares
/// to `sig` in constant time, rejecting a stale or tampered URL.
pub fn verify_audio_signature(secret: &str, file_path: &str, expires_unix: i64, sig: &str) -> Result<()> {
    let provided_sig = hex::decode(sig).map_err(|_| GatewayError::unauthorized("malformed signed audio token"))?;
    let expected_sig = audio_signature(secret, file_path, expires_unix)?;

    if expected_sig.as_slice().ct_eq(&provided_sig).unwrap_u8() != 1 {
        return Err(GatewayError::unauthorized("signed audio token signature mismatch"));
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);
    if now > expires_unix {
        return Err(GatewayError::unauthorized("signed audio token expired"));
    }

    Ok(())
}

/// Bearer-token check for internal service-to-service endpoints (webhook
/// callbacks from the telephony adapter). Constant-time comparison.
pub fn verify_internal_api_key(configured: &str, presented: &str) -> bool {
    configured.as_bytes().ct_eq(presented.as_bytes()).unwrap_u8() == 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voice_token_round_trips() {
        let token = mint_voice_token("secret", "sess-1", Some("user-1"), 60).unwrap();
        let claims = verify_voice_token("secret", &token).unwrap();
        assert_eq!(claims.session_id, "sess-1");
        assert_eq!(claims.token_type, "voice_session");
    }

    #[test]
    fn voice_token_rejects_wrong_secret() {
        let token = mint_voice_token("secret", "sess-1", None, 60).unwrap();
        assert!(verify_voice_token("other-secret", &token).is_err());
    }

    #[test]
    fn signed_audio_url_round_trips() {
        let url = generate_audio_signed_url("secret", "user_recordings/sess-1/vm_1.wav", 300).unwrap();
        assert!(verify_audio_signature("secret", &url.file_path, url.expires_unix, &url.signature).is_ok());
    }

    #[test]
    fn signed_audio_url_rejects_expired() {
        let url = generate_audio_signed_url("secret", "user_recordings/sess-1/vm_1.wav", -10).unwrap();
        assert!(verify_audio_signature("secret", &url.file_path, url.expires_unix, &url.signature).is_err());
    }

    #[test]
    fn signed_audio_url_rejects_tampering() {
        let url = generate_audio_signed_url("secret", "user_recordings/sess-1/vm_1.wav", 300).unwrap();
        assert!(verify_audio_signature("secret", "user_recordings/sess-2/vm_1.wav", url.expires_unix, &url.signature)
            .is_err());
    }

    #[test]
    fn signed_audio_url_rejects_wrong_signature() {
        let url = generate_audio_signed_url("secret", "user_recordings/sess-1/vm_1.wav", 300).unwrap();
        assert!(verify_audio_signature("secret", &url.file_path, url.expires_unix, "00").is_err());
    }
}

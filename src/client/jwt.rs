//! Minimal JWT claim decoding
//!
//! Signatures are not verified; the platform does that. We only need the
//! expiry and subject to schedule refreshes.

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct Claims {
    pub exp: i64,
    #[serde(default)]
    pub sub: Option<String>,
}

/// Decode base64url (URL-safe base64 without padding)
fn base64_decode_url(input: &str) -> Result<Vec<u8>, String> {
    general_purpose::URL_SAFE_NO_PAD
        .decode(input.trim_end_matches('='))
        .map_err(|e| e.to_string())
}

/// Decode the payload section of `token`
pub fn decode_claims(token: &str) -> Result<Claims, ApiError> {
    // header.payload.signature
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ApiError::InvalidToken);
    }

    let payload_bytes = base64_decode_url(parts[1])
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to decode JWT payload: {}", e)))?;

    serde_json::from_slice(&payload_bytes)
        .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse JWT payload: {}", e)))
}

/// Expiration time of `token`
pub fn expires_at(token: &str) -> Result<DateTime<Utc>, ApiError> {
    let claims = decode_claims(token)?;
    DateTime::from_timestamp(claims.exp, 0)
        .ok_or_else(|| ApiError::InvalidResponse("Invalid JWT expiration timestamp".to_string()))
}

#[cfg(test)]
pub(crate) fn encode_test_token(exp: i64, sub: &str) -> String {
    let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = general_purpose::URL_SAFE_NO_PAD
        .encode(format!(r#"{{"exp":{},"sub":"{}"}}"#, exp, sub).as_bytes());
    format!("{}.{}.signature", header, payload)
}

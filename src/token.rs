// Token primitives
// Expiry is decided locally by decoding the bearer token's embedded claim
// set. The token is never verified here; this is a client, not a verifier.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

/// Default safety margin before the real expiry, in seconds. A token that
/// is technically valid at check time must not expire mid-flight during a
/// slow downstream call.
pub const DEFAULT_EXPIRY_BUFFER_SECS: u64 = 300;

/// Access/refresh token pair for one authenticated identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    /// Opaque bearer credential presented on authenticated requests.
    pub access: String,
    /// Secondary credential for obtaining a new access token, if the
    /// server issued one.
    pub refresh: Option<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self {
            access: access.into(),
            refresh,
        }
    }

    /// Whether the access token is expired or will expire within the buffer.
    pub fn is_expired(&self, buffer_seconds: u64) -> bool {
        is_token_expired(&self.access, buffer_seconds)
    }
}

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    exp: Option<f64>,
}

/// Check whether a bearer token is expired or expiring soon.
///
/// The token must be a three-part dot-separated claim set; the middle
/// segment is base64url-decoded and its numeric `exp` claim compared
/// against `now + buffer_seconds`. Every failure path (wrong segment
/// count, undecodable payload, missing or non-numeric `exp`) reports
/// expired: the oracle fails closed and never errors.
pub fn is_token_expired(token: &str, buffer_seconds: u64) -> bool {
    match decode_expiry(token) {
        Some(exp) => (Utc::now().timestamp() + buffer_seconds as i64) as f64 >= exp,
        None => true,
    }
}

fn decode_expiry(token: &str) -> Option<f64> {
    let mut segments = token.split('.');
    let payload = match (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => return None,
    };

    // Accept both padded and unpadded base64url payloads.
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    claims.exp
}

/// Format the value of the auth header, e.g. `Bearer <token>`.
pub fn format_auth_header(token: &str, prefix: &str) -> String {
    format!("{prefix} {token}")
}

/// Mask a token for logging, keeping only the first few characters.
pub fn mask_token(token: &str) -> String {
    const VISIBLE_CHARS: usize = 4;
    if token.len() <= VISIBLE_CHARS {
        return "*".repeat(token.len());
    }
    let visible: String = token.chars().take(VISIBLE_CHARS).collect();
    format!("{}{}", visible, "*".repeat(token.len() - VISIBLE_CHARS))
}

//! Read-only inspection of JWT access tokens.
//!
//! The signature is never checked here; the claims are only used to decide
//! when to refresh ahead of expiry.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Treat a token as expiring this many seconds before its `exp`.
pub const EXPIRY_BUFFER_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub exp: Option<i64>,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl TokenClaims {
    /// Decode the payload segment. `None` for anything that is not a JWT.
    pub fn decode(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD
            .decode(payload.trim_end_matches('='))
            .ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp?, 0)
    }
}

/// Whether `token` is expired or will expire within `buffer_secs`.
/// `None` when the token carries no readable `exp`.
pub fn expires_within(token: &str, buffer_secs: i64) -> Option<bool> {
    let exp = TokenClaims::decode(token)?.exp?;
    Some(Utc::now().timestamp() >= exp - buffer_secs)
}

/// Seconds until expiry, or `None` when expired or unreadable.
pub fn remaining_seconds(token: &str) -> Option<i64> {
    let exp = TokenClaims::decode(token)?.exp?;
    let remaining = exp - Utc::now().timestamp();
    (remaining > 0).then_some(remaining)
}

#[cfg(test)]
pub(crate) fn make_test_token(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({"sub": "1", "username": "admin", "exp": exp}).to_string(),
    );
    format!("{header}.{payload}.signature")
}

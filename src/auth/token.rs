//! Bearer token inspection. Only the payload claims are read; signatures are
//! the server's business.

use base64::Engine as _;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};

/// The decoded payload of a three-part token. Accepts unpadded URL-safe or
/// padded standard base64.
pub fn claims(token: &str) -> Option<serde_json::Value> {
    let mut parts = token.split('.');
    let (Some(_header), Some(payload), Some(_sig), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let trimmed = payload.trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(trimmed)
        .or_else(|_| STANDARD.decode(pad(trimmed)))
        .ok()?;
    serde_json::from_slice(&bytes).ok()
}

/// Expiry time from the payload's `exp` claim, if the token has one.
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let exp = claims(token)?.get("exp")?.as_i64()?;
    DateTime::from_timestamp(exp, 0)
}

/// Account id carried in the token (`user_id`, else `sub`).
pub fn subject(token: &str) -> Option<String> {
    let claims = claims(token)?;
    claims
        .get("user_id")
        .or_else(|| claims.get("sub"))?
        .as_str()
        .map(str::to_string)
}

/// Malformed tokens and tokens without `exp` count as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    match expires_at(token) {
        Some(exp) => now >= exp,
        None => true,
    }
}

fn pad(s: &str) -> String {
    let mut out = s.to_string();
    while out.len() % 4 != 0 {
        out.push('=');
    }
    out
}

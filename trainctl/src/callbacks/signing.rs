//! Inbound callback authentication.
//!
//! Two schemes are supported:
//!
//! - **Standard Webhooks**: HMAC-SHA256 over `{webhook-id}.{webhook-timestamp}.{body}`, sent as
//!   `webhook-signature: v1,<base64>` (several space-separated signatures are allowed during
//!   secret rotation). See <https://www.standardwebhooks.com/>.
//! - **Shared token**: a static secret in a configured header.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Prefix for webhook secrets
pub const SECRET_PREFIX: &str = "whsec_";

/// Extract the raw secret bytes from a `whsec_` prefixed secret.
///
/// Returns `None` if the secret doesn't have the correct prefix or invalid base64.
pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let encoded = secret.strip_prefix(SECRET_PREFIX)?;
    let bytes = BASE64_STANDARD.decode(encoded).ok()?;
    (!bytes.is_empty()).then_some(bytes)
}

fn mac_for(msg_id: &str, timestamp: i64, payload: &[u8], secret: &str) -> Option<HmacSha256> {
    let secret_bytes = decode_secret(secret)?;
    let mut mac = HmacSha256::new_from_slice(&secret_bytes).ok()?;
    mac.update(format!("{msg_id}.{timestamp}.").as_bytes());
    mac.update(payload);
    Some(mac)
}

/// Produce a `v1,<base64>` signature for a payload.
pub fn sign_payload(msg_id: &str, timestamp: i64, payload: &[u8], secret: &str) -> Option<String> {
    let signature = mac_for(msg_id, timestamp, payload, secret)?.finalize().into_bytes();
    Some(format!("v1,{}", BASE64_STANDARD.encode(signature)))
}

/// Check a `webhook-signature` header value against the payload.
///
/// Returns `true` if any `v1` signature in the header matches. Comparison is constant-time.
pub fn verify_signature(msg_id: &str, timestamp: i64, payload: &[u8], signature_header: &str, secret: &str) -> bool {
    let Some(mac) = mac_for(msg_id, timestamp, payload, secret) else {
        return false;
    };

    signature_header
        .split_whitespace()
        .filter_map(|candidate| candidate.strip_prefix("v1,"))
        .filter_map(|encoded| BASE64_STANDARD.decode(encoded).ok())
        .any(|candidate| mac.clone().verify_slice(&candidate).is_ok())
}

/// Whether a callback timestamp lies within `tolerance_secs` of `now` in either direction.
pub fn timestamp_within_tolerance(timestamp: i64, now: i64, tolerance_secs: u64) -> bool {
    now.abs_diff(timestamp) <= tolerance_secs
}

/// Constant-time byte comparison, for shared-token callbacks.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

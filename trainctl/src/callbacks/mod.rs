//! Completion callbacks from the training service.
//!
//! - [`signing`]: signature and token primitives
//! - [`events`]: callback payload parsing
//!
//! [`verify_callback`] is applied at the HTTP boundary before a payload is parsed or reconciled.

pub mod events;
pub mod signing;

use axum::http::HeaderMap;

use crate::config::CallbackVerification;
use crate::errors::Error;

pub const WEBHOOK_ID_HEADER: &str = "webhook-id";
pub const WEBHOOK_TIMESTAMP_HEADER: &str = "webhook-timestamp";
pub const WEBHOOK_SIGNATURE_HEADER: &str = "webhook-signature";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Error> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Error::Unauthenticated {
            message: Some(format!("Missing or invalid {name} header")),
        })
}

/// Authenticate a callback request. `now` is the current unix time in seconds.
pub fn verify_callback(verification: &CallbackVerification, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), Error> {
    match verification {
        CallbackVerification::None => Ok(()),
        CallbackVerification::SharedToken { header_name, token } => {
            let presented = header(headers, header_name)?;
            if signing::constant_time_eq(presented.as_bytes(), token.as_bytes()) {
                Ok(())
            } else {
                Err(Error::Unauthenticated {
                    message: Some("Invalid callback token".to_string()),
                })
            }
        }
        CallbackVerification::StandardWebhooks {
            secret,
            timestamp_tolerance,
        } => {
            let msg_id = header(headers, WEBHOOK_ID_HEADER)?;
            let timestamp: i64 = header(headers, WEBHOOK_TIMESTAMP_HEADER)?
                .trim()
                .parse()
                .map_err(|_| Error::Unauthenticated {
                    message: Some("Invalid webhook-timestamp header".to_string()),
                })?;
            let signature = header(headers, WEBHOOK_SIGNATURE_HEADER)?;

            if !signing::timestamp_within_tolerance(timestamp, now, timestamp_tolerance.as_secs()) {
                return Err(Error::Unauthenticated {
                    message: Some("Callback timestamp outside tolerance".to_string()),
                });
            }

            if !signing::verify_signature(msg_id, timestamp, body, signature, secret) {
                return Err(Error::Unauthenticated {
                    message: Some("Invalid callback signature".to_string()),
                });
            }

            Ok(())
        }
    }
}

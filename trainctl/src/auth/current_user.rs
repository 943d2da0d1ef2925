//! The authenticated caller, extracted from each request.

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace};
use uuid::Uuid;

use crate::{
    AppState,
    auth::session,
    config::Config,
    errors::{Error, Result},
    types::UserId,
};

/// Identity of the caller. Handlers take this as an extractor; its absence is a 401.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
}

/// Extract user from JWT session cookie if present and valid
/// Returns:
/// - None: No session cookie present
/// - Some(Ok(user)): Valid JWT found and verified
/// - Some(Err(error)): Session cookie present but invalid/malformed
fn try_jwt_session_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    config.secret_key.as_ref()?;
    let cookie_header = parts.headers.get(axum::http::header::COOKIE)?;

    let cookie_str = match cookie_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid cookie header: {e}"),
            }));
        }
    };
    let cookie_name = &config.auth.session.cookie_name;

    let mut last_error = None;
    for (name, value) in cookie_str.split(';').filter_map(|c| c.trim().split_once('=')) {
        if name == cookie_name {
            match session::verify_session_token(value, config) {
                Ok(user) => return Some(Ok(user)),
                // Expired tokens are routine; keep looking in case a fresher cookie follows
                Err(e) => last_error = Some(e),
            }
        }
    }

    last_error.map(Err)
}

/// Extract user from a trusted proxy header if enabled and present
fn try_proxy_header_auth(parts: &Parts, config: &Config) -> Option<Result<CurrentUser>> {
    if !config.auth.proxy_header.enabled {
        return None;
    }
    let value = parts.headers.get(&config.auth.proxy_header.header_name)?;

    let parsed = value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(|id| CurrentUser { id })
        .ok_or_else(|| Error::Unauthenticated {
            message: Some(format!("Invalid {} header", config.auth.proxy_header.header_name)),
        });
    Some(parsed)
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let mut any_auth_attempted = false;

        match try_jwt_session_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found JWT session authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => {
                trace!("JWT session authentication failed: {:?}", e);
                any_auth_attempted = true;
            }
            None => trace!("No JWT session authentication attempted"),
        }

        match try_proxy_header_auth(parts, &state.config) {
            Some(Ok(user)) => {
                debug!("Found proxy header authenticated user: {}", user.id);
                return Ok(user);
            }
            Some(Err(e)) => {
                trace!("Proxy header authentication failed: {:?}", e);
                any_auth_attempted = true;
            }
            None => trace!("No proxy header authentication attempted"),
        }

        if any_auth_attempted {
            debug!("All authentication attempts failed");
        }
        Err(Error::Unauthenticated { message: None })
    }
}

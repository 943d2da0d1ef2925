//! Caller authentication.
//!
//! Users sign in through a separate login service. This service only needs to know who is
//! calling, which it learns from one of:
//!
//! - a JWT session cookie signed with `secret_key` ([`session`])
//! - a trusted header set by an authenticating reverse proxy (`auth.proxy_header`)
//!
//! Handlers take [`current_user::CurrentUser`] as an extractor; requests without a valid
//! identity are rejected with 401 before any handler logic runs.

pub mod current_user;
pub mod session;

//! Common type definitions.
//!
//! All entity IDs are UUIDs wrapped in type aliases:
//!
//! - [`UserId`]: User account identifier (issued by the session provider)
//! - [`ProjectId`]: Training project identifier
//!
//! External training jobs are identified by opaque strings chosen by the training
//! service; see [`ExternalJobId`].

use uuid::Uuid;

pub type UserId = Uuid;
pub type ProjectId = Uuid;

/// Identifier assigned by the remote training service to a submitted job.
pub type ExternalJobId = String;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

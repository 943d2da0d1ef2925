//! Persistence layer.
//!
//! - [`handlers`]: store implementations behind the [`handlers::ProjectStore`] trait
//! - [`models`]: record structures matching table schemas
//! - [`errors`]: store-specific error types
//!
//! Migrations live in `migrations/` and are applied through [`crate::migrator`].

pub mod errors;
pub mod handlers;
pub mod models;

//! Database record models matching table schemas.
//!
//! Database models are distinct from API models (see [`crate::api::models`]) so the storage
//! and wire representations can evolve independently.

pub mod projects;

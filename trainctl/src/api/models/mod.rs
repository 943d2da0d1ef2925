//! API request/response models.
//!
//! These are the wire representations; they convert from the database models in
//! [`crate::db::models`] and never expose payment details.

pub mod projects;

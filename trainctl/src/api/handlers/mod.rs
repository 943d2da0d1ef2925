//! HTTP request handlers.
//!
//! - [`projects`]: start training and read project status (authenticated callers)
//! - [`callbacks`]: completion callbacks from the training service

pub mod callbacks;
pub mod projects;

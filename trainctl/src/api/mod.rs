//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers
//! - **[`models`]**: Request/response data structures
//!
//! # API Structure
//!
//! All routes are mounted under `/api`:
//!
//! - `POST /api/projects/{id}/train` - start training a paid project
//! - `GET /api/projects/{id}` - read a project's status
//! - `POST /api/webhooks/completed` - completion callback from the training service
//!
//! OpenAPI documentation is served at `/docs`.

pub mod handlers;
pub mod models;

use crate::db::errors::DbError;
use crate::types::ProjectId;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// Authentication required but not provided
    #[error("Not authenticated")]
    Unauthenticated { message: Option<String> },

    /// Invalid request data or business rule violation
    #[error("{message}")]
    BadRequest { message: String },

    /// Inbound payload (e.g. a completion callback) could not be parsed
    #[error("Invalid payload: {message}")]
    InvalidPayload { message: String },

    /// Requested resource not found, or not visible to the caller
    #[error("{resource} with ID {id} not found")]
    NotFound { resource: String, id: String },

    /// A concurrent request already changed the resource
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// The training service refused the request with a client error
    #[error("Training service rejected the request with status {status}: {detail}")]
    UpstreamRejected { status: u16, detail: String },

    /// The training service could not be reached, timed out, or failed
    #[error("Training service unavailable: {message}")]
    UpstreamUnavailable { message: String },

    /// The remote job was created but the project could not be moved to `processing`.
    /// Requires operator attention: a remote job exists that the store does not know about.
    #[error("Training job {external_job_id} was submitted for project {project_id} but could not be recorded: {reason}")]
    SubmittedButNotRecorded {
        project_id: ProjectId,
        external_job_id: String,
        reason: String,
    },

    /// Generic internal service error
    #[error("Failed to {operation}")]
    Internal { operation: String },

    /// Database operation error
    #[error(transparent)]
    Database(#[from] DbError),

    /// Unexpected error with full context chain
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Error::BadRequest { .. } | Error::InvalidPayload { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::Conflict { .. } => StatusCode::CONFLICT,
            Error::UpstreamRejected { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error())
                .unwrap_or(StatusCode::BAD_REQUEST),
            Error::UpstreamUnavailable { .. } => StatusCode::BAD_GATEWAY,
            Error::SubmittedButNotRecorded { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Database(db_err) => match db_err {
                DbError::NotFound => StatusCode::NOT_FOUND,
                DbError::StaleState => StatusCode::CONFLICT,
                DbError::UniqueViolation { .. } => StatusCode::CONFLICT,
                DbError::CheckViolation { .. } => StatusCode::BAD_REQUEST,
                DbError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Error::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns a user-safe error message, without leaking internal implementation details
    pub fn user_message(&self) -> String {
        match self {
            Error::Unauthenticated { message } => message.clone().unwrap_or_else(|| "Authentication required".to_string()),
            Error::BadRequest { message } => message.clone(),
            Error::InvalidPayload { message } => format!("Invalid payload: {message}"),
            Error::NotFound { resource, id } => format!("{resource} with ID {id} not found"),
            Error::Conflict { message } => message.clone(),
            Error::UpstreamRejected { detail, .. } => format!("Training service rejected the request: {detail}"),
            Error::UpstreamUnavailable { .. } => "Training service is unavailable, please retry later".to_string(),
            Error::SubmittedButNotRecorded { .. } => {
                "Training was started but could not be recorded. Support has been notified; do not retry.".to_string()
            }
            Error::Internal { .. } => "Internal server error".to_string(),
            Error::Database(db_err) => match db_err {
                DbError::NotFound => "Resource not found".to_string(),
                DbError::StaleState => "Resource was modified by another request".to_string(),
                DbError::UniqueViolation { .. } => "Resource already exists".to_string(),
                DbError::CheckViolation { .. } => "Invalid data provided".to_string(),
                DbError::Other(_) => "Database error occurred".to_string(),
            },
            Error::Other(_) => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // Log full error details for debugging - different log levels based on severity
        match &self {
            Error::SubmittedButNotRecorded {
                project_id,
                external_job_id,
                reason,
            } => {
                tracing::error!(
                    submitted_but_not_recorded = true,
                    project_id = %project_id,
                    external_job_id = %external_job_id,
                    reason = %reason,
                    "Remote training job exists without a recorded project state"
                );
            }
            Error::Database(DbError::Other(_)) | Error::Internal { .. } | Error::Other(_) => {
                tracing::error!("Internal service error: {:#}", self);
            }
            Error::UpstreamUnavailable { .. } | Error::UpstreamRejected { .. } => {
                tracing::warn!("Training service error: {}", self);
            }
            Error::Database(_) | Error::Conflict { .. } => {
                tracing::warn!("Conflict error: {}", self);
            }
            Error::Unauthenticated { .. } => {
                tracing::info!("Authorization error: {}", self);
            }
            Error::InvalidPayload { .. } => {
                tracing::warn!("Rejected payload: {}", self);
            }
            Error::BadRequest { .. } | Error::NotFound { .. } => {
                tracing::debug!("Client error: {}", self);
            }
        }

        let status = self.status_code();

        match &self {
            Error::SubmittedButNotRecorded {
                project_id,
                external_job_id,
                ..
            } => {
                let body = json!({
                    "code": "submitted_but_not_recorded",
                    "message": self.user_message(),
                    "project_id": project_id,
                    "external_job_id": external_job_id,
                });
                (status, axum::response::Json(body)).into_response()
            }
            Error::UpstreamRejected { status: upstream, detail } => {
                let body = json!({
                    "code": "upstream_rejected",
                    "message": self.user_message(),
                    "upstream_status": upstream,
                    "detail": detail,
                });
                (status, axum::response::Json(body)).into_response()
            }
            _ => (status, self.user_message()).into_response(),
        }
    }
}

/// Type alias for service operation results
pub type Result<T> = std::result::Result<T, Error>;

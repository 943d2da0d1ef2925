//! Completion callback endpoint called by the training service.
//!
//! Response codes tell the training service whether to redeliver:
//!
//! - 200 for every reconciled callback, including duplicates and unknown jobs
//! - 400 for payloads that cannot be parsed (redelivery will not help)
//! - 401 when verification fails
//! - 5xx only when the store itself failed, so the callback is retried

use axum::{Json, body::Bytes, extract::State, http::HeaderMap};
use chrono::Utc;
use tracing::instrument;

use crate::{
    AppState,
    api::models::projects::CallbackAck,
    callbacks::{events::CompletionEvent, verify_callback},
    errors::{Error, Result},
    training::reconciler::reconcile_completion,
};

#[utoipa::path(
    post,
    path = "/webhooks/completed",
    tag = "callbacks",
    summary = "Training completion callback",
    description = "Receives job status updates from the training service and moves the matching project to \
                   `ready` or `failed`. Idempotent per job.",
    request_body = crate::callbacks::events::CompletionPayload,
    responses(
        (status = 200, description = "Callback accepted", body = CallbackAck),
        (status = 400, description = "Malformed payload"),
        (status = 401, description = "Verification failed"),
        (status = 500, description = "Store unavailable; redeliver later"),
    )
)]
#[instrument(skip_all)]
pub async fn completion_callback(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<CallbackAck>> {
    verify_callback(&state.config.callbacks.verification, &headers, &body, Utc::now().timestamp())?;

    let event = CompletionEvent::parse(&body).map_err(|message| Error::InvalidPayload { message })?;
    let outcome = reconcile_completion(state.store.as_ref(), &event).await?;

    Ok(Json(CallbackAck {
        outcome: outcome.as_str().to_string(),
    }))
}

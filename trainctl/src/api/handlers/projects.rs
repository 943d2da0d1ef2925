//! HTTP handlers for training projects.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use crate::{
    AppState,
    api::models::projects::{ProjectResponse, StartTrainingResponse},
    auth::current_user::CurrentUser,
    errors::{Error, Result},
    training::service,
    types::ProjectId,
};

#[utoipa::path(
    post,
    path = "/projects/{id}/train",
    tag = "projects",
    summary = "Start training",
    description = "Submit the project's photos for model training. The project must belong to the caller, \
                   be paid for, and not have been trained before. Returns the project in `processing` state.",
    params(
        ("id" = uuid::Uuid, Path, description = "Project ID"),
    ),
    responses(
        (status = 200, description = "Training started", body = StartTrainingResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "No eligible project with this ID"),
        (status = 409, description = "Training is already being started by another request"),
        (status = 422, description = "Training service rejected the job"),
        (status = 500, description = "Job submitted but not recorded; do not retry"),
        (status = 502, description = "Training service unavailable; safe to retry"),
    ),
    security(
        ("CookieAuth" = []),
        ("X-Trainctl-User" = [])
    )
)]
#[instrument(skip_all, fields(project_id = %id))]
pub async fn start_training(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    current_user: CurrentUser,
) -> Result<Json<StartTrainingResponse>> {
    let project = service::start_training(state.store.as_ref(), state.trainer.as_ref(), &state.config, current_user.id, id).await?;

    Ok(Json(StartTrainingResponse { project: project.into() }))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "projects",
    summary = "Get project",
    description = "Fetch one of the caller's projects, including its training status.",
    params(
        ("id" = uuid::Uuid, Path, description = "Project ID"),
    ),
    responses(
        (status = 200, description = "Project", body = ProjectResponse),
        (status = 401, description = "Unauthorized"),
        (status = 404, description = "Not found"),
    ),
    security(
        ("CookieAuth" = []),
        ("X-Trainctl-User" = [])
    )
)]
#[instrument(skip_all, fields(project_id = %id))]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<ProjectId>,
    current_user: CurrentUser,
) -> Result<Json<ProjectResponse>> {
    let project = state
        .store
        .get_by_id(id)
        .await?
        .filter(|p| p.owner_id == current_user.id)
        .ok_or_else(|| Error::NotFound {
            resource: "Project".to_string(),
            id: id.to_string(),
        })?;

    Ok(Json(project.into()))
}

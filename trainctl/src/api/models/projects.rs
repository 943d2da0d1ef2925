//! API request and response models for project endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::db::models::projects::{ModelStatus, Project};
use crate::types::{ProjectId, UserId};

/// A training project as seen by its owner.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProjectResponse {
    #[schema(value_type = String, format = "uuid")]
    pub id: ProjectId,
    #[schema(value_type = String, format = "uuid")]
    pub owner_id: UserId,
    pub name: String,
    /// Subject category as entered when the project was created
    pub instance_class: String,
    pub model_status: ModelStatus,
    /// Whether a payment has been recorded for the project
    pub paid: bool,
    /// Job id at the training service, once training has started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_job_id: Option<String>,
    /// Trained model reference, once training has succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Project> for ProjectResponse {
    fn from(project: Project) -> Self {
        Self {
            id: project.id,
            owner_id: project.owner_id,
            name: project.name,
            instance_class: project.instance_class,
            model_status: project.model_status,
            paid: project.payment_reference.is_some(),
            external_job_id: project.external_job_id,
            artifact_reference: project.artifact_reference,
            created_at: project.created_at,
            updated_at: project.updated_at,
        }
    }
}

/// Response body of `POST /api/projects/{id}/train`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct StartTrainingResponse {
    pub project: ProjectResponse,
}

/// Response body of the completion callback endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CallbackAck {
    /// One of `applied`, `already_terminal`, `unknown_job` or `ignored`
    pub outcome: String,
}

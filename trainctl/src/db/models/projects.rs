//! Database models for training projects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use utoipa::ToSchema;

use crate::types::{ExternalJobId, ProjectId, UserId};

/// Lifecycle state of a project's trained model.
///
/// Transitions are monotonic: `not_created -> processing -> ready | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    NotCreated,
    Processing,
    Ready,
    Failed,
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCreated => "not_created",
            Self::Processing => "processing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("Unknown model status: {0}")]
pub struct UnknownModelStatus(String);

impl std::str::FromStr for ModelStatus {
    type Err = UnknownModelStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_created" => Ok(Self::NotCreated),
            "processing" => Ok(Self::Processing),
            "ready" => Ok(Self::Ready),
            "failed" => Ok(Self::Failed),
            _ => Err(UnknownModelStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for ModelStatus {
    type Error = UnknownModelStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Final outcome reported by the training service for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalOutcome {
    Succeeded,
    Failed,
}

impl TerminalOutcome {
    pub fn target_status(&self) -> ModelStatus {
        match self {
            Self::Succeeded => ModelStatus::Ready,
            Self::Failed => ModelStatus::Failed,
        }
    }
}

/// Database model for a training project.
#[derive(Debug, Clone, FromRow)]
pub struct Project {
    pub id: ProjectId,
    pub owner_id: UserId,
    pub name: String,
    /// Free-form subject category as entered by the user, e.g. "boy" or "golden retriever"
    pub instance_class: String,
    #[sqlx(try_from = "String")]
    pub model_status: ModelStatus,
    pub payment_reference: Option<String>,
    pub external_job_id: Option<ExternalJobId>,
    pub artifact_reference: Option<String>,
    /// Set while a start-training request holds the submission lease
    pub submission_claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether the project may be submitted for training by `owner_id`.
    /// Ownership, state and payment are checked together so callers cannot tell which failed.
    pub fn is_eligible_for(&self, owner_id: UserId) -> bool {
        self.owner_id == owner_id && self.model_status == ModelStatus::NotCreated && self.payment_reference.is_some()
    }

    /// Whether a live submission lease is held, given the lease duration.
    pub fn has_live_claim(&self, now: DateTime<Utc>, lease: chrono::Duration) -> bool {
        self.submission_claimed_at.is_some_and(|claimed_at| claimed_at + lease > now)
    }
}

/// Request to create a new project.
#[derive(Debug, Clone)]
pub struct ProjectCreateDBRequest {
    pub owner_id: UserId,
    pub name: String,
    pub instance_class: String,
    pub payment_reference: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn project(owner_id: UserId, status: ModelStatus, payment: Option<&str>) -> Project {
        let now = Utc::now();
        Project {
            id: Uuid::new_v4(),
            owner_id,
            name: "portraits".to_string(),
            instance_class: "girl".to_string(),
            model_status: status,
            payment_reference: payment.map(str::to_string),
            external_job_id: None,
            artifact_reference: None,
            submission_claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [ModelStatus::NotCreated, ModelStatus::Processing, ModelStatus::Ready, ModelStatus::Failed] {
            assert_eq!(status.as_str().parse::<ModelStatus>().unwrap(), status);
        }
        assert!("training".parse::<ModelStatus>().is_err());
    }

    #[test]
    fn eligibility_requires_owner_state_and_payment() {
        let owner = Uuid::new_v4();
        assert!(project(owner, ModelStatus::NotCreated, Some("pi_1")).is_eligible_for(owner));
        assert!(!project(owner, ModelStatus::NotCreated, Some("pi_1")).is_eligible_for(Uuid::new_v4()));
        assert!(!project(owner, ModelStatus::NotCreated, None).is_eligible_for(owner));
        assert!(!project(owner, ModelStatus::Processing, Some("pi_1")).is_eligible_for(owner));
    }

    #[test]
    fn claim_expires_after_lease() {
        let mut p = project(Uuid::new_v4(), ModelStatus::NotCreated, Some("pi_1"));
        let now = Utc::now();
        let lease = chrono::Duration::minutes(10);
        assert!(!p.has_live_claim(now, lease));

        p.submission_claimed_at = Some(now - chrono::Duration::minutes(5));
        assert!(p.has_live_claim(now, lease));

        p.submission_claimed_at = Some(now - chrono::Duration::minutes(11));
        assert!(!p.has_live_claim(now, lease));
    }
}

//! In-memory project store.
//!
//! Holds all projects in a single `RwLock`ed map; each conditional write checks its
//! precondition and mutates under the same write guard, which gives it the same
//! all-or-nothing semantics as the PostgreSQL store. Projects are lost on restart, so this
//! is meant for tests and local development.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use uuid::Uuid;

use super::projects::ProjectStore;
use crate::db::errors::{DbError, Result};
use crate::db::models::projects::{ModelStatus, Project, ProjectCreateDBRequest, TerminalOutcome};
use crate::types::{ProjectId, UserId};

#[derive(Clone, Default)]
pub struct InMemoryProjects {
    projects: Arc<RwLock<HashMap<ProjectId, Project>>>,
}

impl InMemoryProjects {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ProjectStore for InMemoryProjects {
    async fn create(&self, request: &ProjectCreateDBRequest) -> Result<Project> {
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4(),
            owner_id: request.owner_id,
            name: request.name.clone(),
            instance_class: request.instance_class.clone(),
            model_status: ModelStatus::NotCreated,
            payment_reference: request.payment_reference.clone(),
            external_job_id: None,
            artifact_reference: None,
            submission_claimed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.projects.write().insert(project.id, project.clone());
        Ok(project)
    }

    async fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>> {
        Ok(self.projects.read().get(&id).cloned())
    }

    async fn find_eligible(&self, owner_id: UserId, id: ProjectId) -> Result<Project> {
        self.projects
            .read()
            .get(&id)
            .filter(|p| p.is_eligible_for(owner_id))
            .cloned()
            .ok_or(DbError::NotFound)
    }

    async fn claim_submission(&self, owner_id: UserId, id: ProjectId, lease: Duration) -> Result<Project> {
        let now = Utc::now();
        let mut projects = self.projects.write();
        let project = projects
            .get_mut(&id)
            .filter(|p| p.is_eligible_for(owner_id) && p.external_job_id.is_none() && !p.has_live_claim(now, lease))
            .ok_or(DbError::StaleState)?;

        project.submission_claimed_at = Some(now);
        project.updated_at = now;
        Ok(project.clone())
    }

    async fn release_submission(&self, id: ProjectId, claimed_at: DateTime<Utc>) -> Result<()> {
        if let Some(project) = self
            .projects
            .write()
            .get_mut(&id)
            .filter(|p| p.model_status == ModelStatus::NotCreated && p.submission_claimed_at == Some(claimed_at))
        {
            project.submission_claimed_at = None;
            project.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn transition_to_processing(&self, id: ProjectId, external_job_id: &str) -> Result<Project> {
        let mut projects = self.projects.write();

        if projects
            .values()
            .any(|p| p.external_job_id.as_deref() == Some(external_job_id))
        {
            return Err(DbError::UniqueViolation {
                constraint: Some("projects_external_job_id_unique".to_string()),
                table: Some("projects".to_string()),
                message: format!("external job id {external_job_id} already recorded"),
            });
        }

        let project = projects.get_mut(&id).ok_or(DbError::NotFound)?;
        if project.model_status != ModelStatus::NotCreated || project.payment_reference.is_none() || project.external_job_id.is_some() {
            return Err(DbError::StaleState);
        }

        project.model_status = ModelStatus::Processing;
        project.external_job_id = Some(external_job_id.to_string());
        project.submission_claimed_at = None;
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    async fn transition_to_terminal(
        &self,
        external_job_id: &str,
        outcome: TerminalOutcome,
        artifact_reference: Option<&str>,
    ) -> Result<Project> {
        let mut projects = self.projects.write();
        let project = projects
            .values_mut()
            .find(|p| p.external_job_id.as_deref() == Some(external_job_id))
            .ok_or(DbError::NotFound)?;

        if project.model_status != ModelStatus::Processing {
            return Err(DbError::StaleState);
        }

        project.model_status = outcome.target_status();
        if let Some(artifact) = artifact_reference {
            project.artifact_reference = Some(artifact.to_string());
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paid_request(owner_id: UserId) -> ProjectCreateDBRequest {
        ProjectCreateDBRequest {
            owner_id,
            name: "portraits".to_string(),
            instance_class: "girl".to_string(),
            payment_reference: Some("pi_123".to_string()),
        }
    }

    #[tokio::test]
    async fn find_eligible_hides_partial_matches() {
        let store = InMemoryProjects::new();
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();
        let unpaid = store
            .create(&ProjectCreateDBRequest {
                payment_reference: None,
                ..paid_request(owner)
            })
            .await
            .unwrap();

        assert_eq!(store.find_eligible(owner, project.id).await.unwrap().id, project.id);
        assert!(matches!(store.find_eligible(Uuid::new_v4(), project.id).await, Err(DbError::NotFound)));
        assert!(matches!(store.find_eligible(owner, unpaid.id).await, Err(DbError::NotFound)));
        assert!(matches!(store.find_eligible(owner, Uuid::new_v4()).await, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn claim_is_exclusive_until_released_or_expired() {
        let store = InMemoryProjects::new();
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();
        let lease = Duration::minutes(10);

        let claimed = store.claim_submission(owner, project.id, lease).await.unwrap();
        assert!(matches!(
            store.claim_submission(owner, project.id, lease).await,
            Err(DbError::StaleState)
        ));

        store
            .release_submission(project.id, claimed.submission_claimed_at.unwrap())
            .await
            .unwrap();
        store.claim_submission(owner, project.id, lease).await.unwrap();

        // A zero-length lease is always expired
        assert!(store.claim_submission(owner, project.id, Duration::zero()).await.is_ok());
    }

    #[tokio::test]
    async fn release_ignores_a_lease_taken_over_after_expiry() {
        let store = InMemoryProjects::new();
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();
        let lease = Duration::minutes(10);

        let first = store.claim_submission(owner, project.id, lease).await.unwrap();
        let second = store
            .claim_submission(owner, project.id, Duration::zero())
            .await
            .unwrap();

        store
            .release_submission(project.id, first.submission_claimed_at.unwrap())
            .await
            .unwrap();
        let stored = store.get_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(stored.submission_claimed_at, second.submission_claimed_at);
        assert!(matches!(
            store.claim_submission(owner, project.id, lease).await,
            Err(DbError::StaleState)
        ));

        store
            .release_submission(project.id, second.submission_claimed_at.unwrap())
            .await
            .unwrap();
        assert!(store.claim_submission(owner, project.id, lease).await.is_ok());
    }

    #[tokio::test]
    async fn processing_then_terminal_exactly_once() {
        let store = InMemoryProjects::new();
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();

        let processing = store.transition_to_processing(project.id, "job-1").await.unwrap();
        assert_eq!(processing.model_status, ModelStatus::Processing);
        assert_eq!(processing.external_job_id.as_deref(), Some("job-1"));
        assert!(matches!(
            store.transition_to_processing(project.id, "job-2").await,
            Err(DbError::StaleState)
        ));

        let ready = store
            .transition_to_terminal("job-1", TerminalOutcome::Succeeded, Some("model-v1"))
            .await
            .unwrap();
        assert_eq!(ready.model_status, ModelStatus::Ready);
        assert_eq!(ready.artifact_reference.as_deref(), Some("model-v1"));

        assert!(matches!(
            store.transition_to_terminal("job-1", TerminalOutcome::Failed, None).await,
            Err(DbError::StaleState)
        ));
        assert!(matches!(
            store.transition_to_terminal("nope", TerminalOutcome::Succeeded, None).await,
            Err(DbError::NotFound)
        ));
        assert_eq!(store.get_by_id(project.id).await.unwrap().unwrap().model_status, ModelStatus::Ready);
    }

    #[tokio::test]
    async fn unpaid_project_cannot_enter_processing() {
        let store = InMemoryProjects::new();
        let project = store
            .create(&ProjectCreateDBRequest {
                payment_reference: None,
                ..paid_request(Uuid::new_v4())
            })
            .await
            .unwrap();

        assert!(matches!(
            store.transition_to_processing(project.id, "job-1").await,
            Err(DbError::StaleState)
        ));
        let unchanged = store.get_by_id(project.id).await.unwrap().unwrap();
        assert_eq!(unchanged.model_status, ModelStatus::NotCreated);
        assert!(unchanged.external_job_id.is_none());
    }
}

//! Project state store: the authoritative record of project lifecycle state.
//!
//! Every state-changing operation is a single conditional write. The precondition is part of
//! the write itself (`UPDATE ... WHERE <state predicate> RETURNING *`), so two concurrent
//! callers can never both succeed and no separate read-then-write window exists.

use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;
use tracing::instrument;
use uuid::Uuid;

use crate::db::errors::{DbError, Result};
use crate::db::models::projects::{ModelStatus, Project, ProjectCreateDBRequest, TerminalOutcome};
use crate::types::{ProjectId, UserId, abbrev_uuid};

/// Storage boundary for projects.
///
/// Implemented by [`Projects`] (PostgreSQL) and
/// [`InMemoryProjects`](super::in_memory::InMemoryProjects).
#[async_trait::async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert a new project in `not_created` state.
    async fn create(&self, request: &ProjectCreateDBRequest) -> Result<Project>;

    /// Plain read by ID, regardless of owner or state.
    async fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>>;

    /// Fetch the project only if it is owned by `owner_id`, still `not_created`, and has a
    /// payment reference. Any mismatch yields `DbError::NotFound`.
    async fn find_eligible(&self, owner_id: UserId, id: ProjectId) -> Result<Project>;

    /// Take the submission lease for an eligible project. Fails with `DbError::StaleState` if
    /// the project is no longer eligible or another live lease exists.
    async fn claim_submission(&self, owner_id: UserId, id: ProjectId, lease: Duration) -> Result<Project>;

    /// Drop the submission lease taken at `claimed_at` after a definite submission failure.
    /// A lease re-taken since then is left alone.
    async fn release_submission(&self, id: ProjectId, claimed_at: DateTime<Utc>) -> Result<()>;

    /// `not_created -> processing`, recording the external job id.
    async fn transition_to_processing(&self, id: ProjectId, external_job_id: &str) -> Result<Project>;

    /// `processing -> ready | failed` for the project bound to `external_job_id`.
    ///
    /// `DbError::NotFound` when no project carries the job id, `DbError::StaleState` when
    /// the project is not in `processing`.
    async fn transition_to_terminal(
        &self,
        external_job_id: &str,
        outcome: TerminalOutcome,
        artifact_reference: Option<&str>,
    ) -> Result<Project>;
}

/// PostgreSQL-backed project store.
#[derive(Clone)]
pub struct Projects {
    pool: PgPool,
}

impl Projects {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguish "no such record" from "record in the wrong state" after a conditional write
    /// matched nothing.
    async fn miss_reason(&self, id: Option<ProjectId>, external_job_id: Option<&str>) -> Result<DbError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM projects
                WHERE ($1::uuid IS NULL OR id = $1)
                  AND ($2::text IS NULL OR external_job_id = $2)
            )
            "#,
        )
        .bind(id)
        .bind(external_job_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(if exists { DbError::StaleState } else { DbError::NotFound })
    }
}

#[async_trait::async_trait]
impl ProjectStore for Projects {
    #[instrument(skip(self, request), fields(owner_id = %abbrev_uuid(&request.owner_id)), err)]
    async fn create(&self, request: &ProjectCreateDBRequest) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            INSERT INTO projects (id, owner_id, name, instance_class, model_status, payment_reference)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(request.owner_id)
        .bind(&request.name)
        .bind(&request.instance_class)
        .bind(ModelStatus::NotCreated.as_str())
        .bind(&request.payment_reference)
        .fetch_one(&self.pool)
        .await?;

        Ok(project)
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&self, id: ProjectId) -> Result<Option<Project>> {
        let project = sqlx::query_as::<_, Project>("SELECT * FROM projects WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(project)
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id), project_id = %abbrev_uuid(&id)), err)]
    async fn find_eligible(&self, owner_id: UserId, id: ProjectId) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            SELECT * FROM projects
            WHERE id = $1
              AND owner_id = $2
              AND model_status = 'not_created'
              AND payment_reference IS NOT NULL
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&self.pool)
        .await?;

        project.ok_or(DbError::NotFound)
    }

    #[instrument(skip(self), fields(owner_id = %abbrev_uuid(&owner_id), project_id = %abbrev_uuid(&id)), err)]
    async fn claim_submission(&self, owner_id: UserId, id: ProjectId, lease: Duration) -> Result<Project> {
        let now = Utc::now();
        let expired_before: DateTime<Utc> = now - lease;

        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET submission_claimed_at = $3, updated_at = $3
            WHERE id = $1
              AND owner_id = $2
              AND model_status = 'not_created'
              AND payment_reference IS NOT NULL
              AND external_job_id IS NULL
              AND (submission_claimed_at IS NULL OR submission_claimed_at <= $4)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(now)
        .bind(expired_before)
        .fetch_optional(&self.pool)
        .await?;

        project.ok_or(DbError::StaleState)
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn release_submission(&self, id: ProjectId, claimed_at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE projects
            SET submission_claimed_at = NULL, updated_at = NOW()
            WHERE id = $1 AND model_status = 'not_created' AND submission_claimed_at = $2
            "#,
        )
        .bind(id)
        .bind(claimed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self), fields(project_id = %abbrev_uuid(&id)), err)]
    async fn transition_to_processing(&self, id: ProjectId, external_job_id: &str) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET model_status = 'processing',
                external_job_id = $2,
                submission_claimed_at = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND model_status = 'not_created'
              AND payment_reference IS NOT NULL
              AND external_job_id IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(external_job_id)
        .fetch_optional(&self.pool)
        .await?;

        match project {
            Some(project) => Ok(project),
            None => Err(self.miss_reason(Some(id), None).await?),
        }
    }

    #[instrument(skip(self), fields(outcome = ?outcome), err)]
    async fn transition_to_terminal(
        &self,
        external_job_id: &str,
        outcome: TerminalOutcome,
        artifact_reference: Option<&str>,
    ) -> Result<Project> {
        let project = sqlx::query_as::<_, Project>(
            r#"
            UPDATE projects
            SET model_status = $2,
                artifact_reference = COALESCE($3, artifact_reference),
                updated_at = NOW()
            WHERE external_job_id = $1
              AND model_status = 'processing'
            RETURNING *
            "#,
        )
        .bind(external_job_id)
        .bind(outcome.target_status().as_str())
        .bind(artifact_reference)
        .fetch_optional(&self.pool)
        .await?;

        match project {
            Some(project) => Ok(project),
            None => Err(self.miss_reason(None, Some(external_job_id)).await?),
        }
    }
}

#[cfg(all(test, feature = "postgres-tests"))]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn paid_request(owner_id: UserId) -> ProjectCreateDBRequest {
        ProjectCreateDBRequest {
            owner_id,
            name: "portraits".to_string(),
            instance_class: "girl".to_string(),
            payment_reference: Some("pi_123".to_string()),
        }
    }

    #[sqlx::test]
    async fn eligible_lookup_applies_every_predicate(pool: PgPool) {
        let store = Projects::new(pool);
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();

        assert!(store.find_eligible(owner, project.id).await.is_ok());
        assert!(matches!(
            store.find_eligible(Uuid::new_v4(), project.id).await,
            Err(DbError::NotFound)
        ));

        let unpaid = store
            .create(&ProjectCreateDBRequest {
                payment_reference: None,
                ..paid_request(owner)
            })
            .await
            .unwrap();
        assert!(matches!(store.find_eligible(owner, unpaid.id).await, Err(DbError::NotFound)));
    }

    #[sqlx::test]
    async fn only_one_claim_wins(pool: PgPool) {
        let store = Projects::new(pool);
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();
        let lease = Duration::minutes(10);

        let (a, b) = tokio::join!(
            store.claim_submission(owner, project.id, lease),
            store.claim_submission(owner, project.id, lease)
        );
        assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
        let first = a.or(b).unwrap().submission_claimed_at.unwrap();

        // An expired lease taken over by another request survives the first holder's release
        let second = store
            .claim_submission(owner, project.id, Duration::zero())
            .await
            .unwrap()
            .submission_claimed_at
            .unwrap();
        store.release_submission(project.id, first).await.unwrap();
        assert!(matches!(
            store.claim_submission(owner, project.id, lease).await,
            Err(DbError::StaleState)
        ));

        store.release_submission(project.id, second).await.unwrap();
        assert!(store.claim_submission(owner, project.id, lease).await.is_ok());
    }

    #[sqlx::test]
    async fn lifecycle_transitions_are_conditional(pool: PgPool) {
        let store = Projects::new(pool);
        let owner = Uuid::new_v4();
        let project = store.create(&paid_request(owner)).await.unwrap();

        let processing = store.transition_to_processing(project.id, "job-1").await.unwrap();
        assert_eq!(processing.model_status, ModelStatus::Processing);
        assert!(processing.submission_claimed_at.is_none());
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
            store.transition_to_terminal("job-unknown", TerminalOutcome::Succeeded, None).await,
            Err(DbError::NotFound)
        ));
    }
}

//! Start-training orchestration.
//!
//! The flow for one request:
//!
//! 1. **Guard** - the caller must own a `not_created`, paid project.
//! 2. **Claim** - take the project's submission lease with a conditional write, so that
//!    concurrent requests for the same project produce at most one remote job.
//! 3. **Build** - normalise the instance class and assemble the job payload.
//! 4. **Submit** - one call to the training service, bounded by the configured timeout.
//! 5. **Record** - `not_created -> processing` with the returned job id.
//!
//! Every failure before step 4 leaves the project untouched. A definite submission failure
//! releases the lease. If step 5 fails after a job was created, the caller receives
//! [`Error::SubmittedButNotRecorded`] and the lease is kept so the project cannot be
//! resubmitted until an operator reconciles it or the lease expires.

use metrics::counter;
use tracing::{error, info, instrument, warn};

use crate::config::Config;
use crate::db::errors::DbError;
use crate::db::handlers::ProjectStore;
use crate::db::models::projects::Project;
use crate::errors::{Error, Result};
use crate::training::client::{SubmitError, TrainingService};
use crate::training::instance_class::resolve_instance_class;
use crate::training::request::build_training_request;
use crate::types::{ProjectId, UserId, abbrev_uuid};

fn project_not_found(id: ProjectId) -> Error {
    Error::NotFound {
        resource: "Project".to_string(),
        id: id.to_string(),
    }
}

fn record_submission(outcome: &'static str) {
    counter!("trainctl_training_submissions_total", "outcome" => outcome).increment(1);
}

#[instrument(
    skip(store, trainer, config),
    fields(owner_id = %abbrev_uuid(&owner_id), project_id = %abbrev_uuid(&project_id)),
    err
)]
pub async fn start_training(
    store: &dyn ProjectStore,
    trainer: &dyn TrainingService,
    config: &Config,
    owner_id: UserId,
    project_id: ProjectId,
) -> Result<Project> {
    store.find_eligible(owner_id, project_id).await.map_err(|e| match e {
        DbError::NotFound => project_not_found(project_id),
        other => Error::Database(other),
    })?;

    let lease = chrono::Duration::from_std(config.trainer.submission_lease).map_err(|e| Error::Internal {
        operation: format!("convert submission lease: {e}"),
    })?;
    let project = store
        .claim_submission(owner_id, project_id, lease)
        .await
        .map_err(|e| match e {
            DbError::StaleState => Error::Conflict {
                message: "Training for this project is already being started".to_string(),
            },
            DbError::NotFound => project_not_found(project_id),
            other => Error::Database(other),
        })?;

    let instance_class = resolve_instance_class(&project.instance_class);
    let request = build_training_request(
        &project,
        &instance_class,
        &config.trainer,
        &config.storage,
        &config.completion_callback_url(),
    );

    let external_job_id = match trainer.submit(&request).await {
        Ok(id) => id,
        Err(SubmitError::MalformedResponse(message)) => {
            // A job may exist remotely, so the lease stays in place
            error!(project_id = %project_id, error = %message, "Training service response had no job id");
            record_submission("malformed_response");
            return Err(Error::UpstreamUnavailable { message });
        }
        Err(err) => {
            // Only this request's lease is released; a newer claim after expiry stays put
            if let Some(claimed_at) = project.submission_claimed_at
                && let Err(release_err) = store.release_submission(project_id, claimed_at).await
            {
                warn!(error = %release_err, "Failed to release submission lease; it will expire");
            }
            return Err(match err {
                SubmitError::Rejected { status, detail } => {
                    record_submission("rejected");
                    Error::UpstreamRejected { status, detail }
                }
                SubmitError::Unavailable(message) => {
                    record_submission("unavailable");
                    Error::UpstreamUnavailable { message }
                }
                SubmitError::MalformedResponse(message) => Error::UpstreamUnavailable { message },
            });
        }
    };

    match store.transition_to_processing(project_id, &external_job_id).await {
        Ok(project) => {
            record_submission("submitted");
            info!(external_job_id = %external_job_id, instance_class = %instance_class, "Training job submitted");
            Ok(project)
        }
        Err(e) => {
            record_submission("not_recorded");
            Err(Error::SubmittedButNotRecorded {
                project_id,
                external_job_id,
                reason: e.to_string(),
            })
        }
    }
}

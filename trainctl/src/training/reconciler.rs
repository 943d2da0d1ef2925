//! Applies completion callbacks to project state.
//!
//! Callbacks may arrive zero, one or many times and in any order. Each one is reduced to a
//! single conditional `processing -> ready | failed` write keyed by job id, so replays and
//! callbacks for jobs we never recorded are harmless no-ops.

use metrics::counter;
use tracing::{debug, info, instrument, warn};

use crate::callbacks::events::{CompletionEvent, JobStatus};
use crate::db::errors::DbError;
use crate::db::handlers::ProjectStore;
use crate::db::models::projects::Project;

#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The project moved to a terminal state.
    Applied(Project),
    /// The job's project was not in `processing`; usually a redelivered callback.
    AlreadyTerminal,
    /// No project carries this job id.
    UnknownJob,
    /// The callback reported a non-terminal status.
    Ignored,
}

impl ReconcileOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Applied(_) => "applied",
            Self::AlreadyTerminal => "already_terminal",
            Self::UnknownJob => "unknown_job",
            Self::Ignored => "ignored",
        }
    }
}

/// Reconcile one completion event. Only store failures are errors.
#[instrument(skip(store, event), fields(external_job_id = %event.external_job_id), err)]
pub async fn reconcile_completion(store: &dyn ProjectStore, event: &CompletionEvent) -> Result<ReconcileOutcome, DbError> {
    let Some(outcome) = event.outcome() else {
        if let JobStatus::InProgress(status) = &event.status {
            debug!(status = %status, "Ignoring non-terminal job status");
        }
        counter!("trainctl_callbacks_total", "outcome" => "ignored").increment(1);
        return Ok(ReconcileOutcome::Ignored);
    };

    let result = match store
        .transition_to_terminal(&event.external_job_id, outcome, event.artifact_reference())
        .await
    {
        Ok(project) => {
            info!(project_id = %project.id, status = %project.model_status, "Training job completed");
            if let JobStatus::Failed { reason: Some(reason) } = &event.status {
                warn!(project_id = %project.id, reason = %reason, "Training job failed");
            }
            ReconcileOutcome::Applied(project)
        }
        Err(DbError::StaleState) => {
            info!("Project already left processing, callback is a duplicate");
            ReconcileOutcome::AlreadyTerminal
        }
        Err(DbError::NotFound) => {
            warn!("Callback for a job no project is waiting on");
            ReconcileOutcome::UnknownJob
        }
        Err(e) => return Err(e),
    };

    counter!("trainctl_callbacks_total", "outcome" => result.as_str()).increment(1);
    Ok(result)
}

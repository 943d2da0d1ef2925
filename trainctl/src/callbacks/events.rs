//! Completion callback payloads sent by the training service.

use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;

use crate::db::models::projects::TerminalOutcome;
use crate::types::ExternalJobId;

/// Body of a completion callback. Only `id` and `status` are required; the training
/// service sends the full job object and unknown fields are ignored.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CompletionPayload {
    /// Job id returned when the training was created
    pub id: String,
    /// Job status, e.g. `succeeded`, `failed` or `canceled`
    pub status: String,
    /// Trained model version, present on success
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub output: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub error: Option<Value>,
}

/// What a callback means for the job it names.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Succeeded { artifact_reference: Option<String> },
    Failed { reason: Option<String> },
    /// Not a terminal status (e.g. `starting`, `processing`); nothing to reconcile.
    InProgress(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionEvent {
    pub external_job_id: ExternalJobId,
    pub status: JobStatus,
}

impl CompletionEvent {
    /// Parse a raw callback body.
    pub fn parse(body: &[u8]) -> Result<Self, String> {
        let payload: CompletionPayload = serde_json::from_slice(body).map_err(|e| e.to_string())?;
        Self::try_from(payload)
    }

    pub fn outcome(&self) -> Option<TerminalOutcome> {
        match self.status {
            JobStatus::Succeeded { .. } => Some(TerminalOutcome::Succeeded),
            JobStatus::Failed { .. } => Some(TerminalOutcome::Failed),
            JobStatus::InProgress(_) => None,
        }
    }

    pub fn artifact_reference(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Succeeded { artifact_reference } => artifact_reference.as_deref(),
            _ => None,
        }
    }
}

impl TryFrom<CompletionPayload> for CompletionEvent {
    type Error = String;

    fn try_from(payload: CompletionPayload) -> Result<Self, Self::Error> {
        let external_job_id = payload.id.trim().to_string();
        if external_job_id.is_empty() {
            return Err("job id is empty".to_string());
        }

        let status = match payload.status.trim().to_lowercase().as_str() {
            "succeeded" => JobStatus::Succeeded {
                artifact_reference: payload.version.filter(|v| !v.is_empty()).or_else(|| {
                    payload
                        .output
                        .as_ref()
                        .and_then(|o| o.get("version"))
                        .and_then(Value::as_str)
                        .map(str::to_string)
                }),
            },
            "failed" | "canceled" | "cancelled" => JobStatus::Failed {
                reason: payload.error.map(|e| match e {
                    Value::String(s) => s,
                    other => other.to_string(),
                }),
            },
            "" => return Err("status is empty".to_string()),
            other => JobStatus::InProgress(other.to_string()),
        };

        Ok(Self { external_job_id, status })
    }
}

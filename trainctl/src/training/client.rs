//! Client for the remote training service.
//!
//! [`TrainingService`] is the single seam through which training jobs leave this process. The
//! production implementation is [`TrainingClient`]; tests substitute a mock.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::TrainerConfig;
use crate::training::request::TrainingRequest;
use crate::types::ExternalJobId;

/// Longest upstream error body echoed back to callers.
const MAX_DETAIL_LEN: usize = 512;

/// Why a submission did not yield a job id.
#[derive(Debug, Error)]
pub enum SubmitError {
    /// The service answered with a 4xx. Retrying the same request will not help.
    #[error("training service rejected the job with status {status}: {detail}")]
    Rejected { status: u16, detail: String },

    /// Timeout, connection failure or 5xx. The job was not created.
    #[error("training service unavailable: {0}")]
    Unavailable(String),

    /// The service answered 2xx but without a usable job id. A job may or may not exist.
    #[error("training service returned an unusable response: {0}")]
    MalformedResponse(String),
}

#[async_trait]
pub trait TrainingService: Send + Sync {
    /// Submit a job and return the id the service assigned to it. Does not retry.
    async fn submit(&self, request: &TrainingRequest) -> Result<ExternalJobId, SubmitError>;
}

#[derive(Debug, Deserialize)]
struct CreatedTraining {
    id: Option<String>,
}

/// reqwest-backed client for the `/v1/trainings` API.
pub struct TrainingClient {
    client: Client,
    trainings_url: Url,
    api_token: String,
    request_timeout: Duration,
}

impl TrainingClient {
    pub fn new(config: &TrainerConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let trainings_url = with_trailing_slash(config.base_url.clone()).join("v1/trainings")?;
        let api_token = config
            .api_token
            .clone()
            .ok_or_else(|| anyhow::anyhow!("trainer.api_token is not configured"))?;

        Ok(Self {
            client,
            trainings_url,
            api_token,
            request_timeout: config.request_timeout,
        })
    }
}

/// `Url::join` replaces the last path segment unless the base ends in a slash, which would drop
/// any path prefix on the configured base URL.
fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn truncate_detail(mut detail: String) -> String {
    if detail.len() > MAX_DETAIL_LEN {
        let mut cut = MAX_DETAIL_LEN;
        while !detail.is_char_boundary(cut) {
            cut -= 1;
        }
        detail.truncate(cut);
    }
    detail
}

/// Pull a human-readable message out of an error body, falling back to the raw text.
fn error_detail(body: String) -> String {
    let parsed = serde_json::from_str::<serde_json::Value>(&body).ok().and_then(|v| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| v.get(key).and_then(|d| d.as_str()).map(str::to_string))
    });
    truncate_detail(parsed.unwrap_or(body))
}

#[async_trait]
impl TrainingService for TrainingClient {
    #[instrument(skip(self, request), fields(model = %request.model), err)]
    async fn submit(&self, request: &TrainingRequest) -> Result<ExternalJobId, SubmitError> {
        debug!(url = %self.trainings_url, "Submitting training job");

        let response = self
            .client
            .post(self.trainings_url.clone())
            .header("Authorization", format!("Token {}", self.api_token))
            .json(request)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmitError::Unavailable(format!("no response within {}", humantime::format_duration(self.request_timeout)))
                } else {
                    SubmitError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();

        if !status.is_success() {
            // The job was not created, so a partial error body only loses detail
            let body = response.text().await.unwrap_or_default();
            if status.is_client_error() {
                warn!(status = status.as_u16(), "Training service rejected job");
                return Err(SubmitError::Rejected {
                    status: status.as_u16(),
                    detail: error_detail(body),
                });
            }
            return Err(SubmitError::Unavailable(format!(
                "status {}: {}",
                status.as_u16(),
                error_detail(body)
            )));
        }

        // A 2xx means the job may exist upstream; an unreadable body must not look retryable
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::MalformedResponse(format!("{status} response body unreadable: {e}")))?;

        let created: CreatedTraining = serde_json::from_str(&body)
            .map_err(|e| SubmitError::MalformedResponse(format!("invalid JSON in {status} response: {e}")))?;

        match created.id {
            Some(id) if !id.is_empty() => {
                debug!(external_job_id = %id, "Training job created");
                Ok(id)
            }
            _ => Err(SubmitError::MalformedResponse(format!(
                "{} response without a job id",
                status.as_u16()
            ))),
        }
    }
}

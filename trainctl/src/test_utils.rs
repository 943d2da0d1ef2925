//! Shared fixtures for unit and handler tests.

use async_trait::async_trait;
use axum_test::TestServer;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::{
    AppState,
    auth::{current_user::CurrentUser, session},
    config::{Config, DatabaseConfig},
    db::{
        errors::{DbError, Result as DbResult},
        handlers::{InMemoryProjects, ProjectStore},
        models::projects::{Project, ProjectCreateDBRequest, TerminalOutcome},
    },
    training::{
        client::{SubmitError, TrainingService},
        request::TrainingRequest,
    },
    types::{ExternalJobId, ProjectId, UserId},
};

pub fn test_config() -> Config {
    let mut config = Config {
        secret_key: Some("test-secret-key-for-sessions".to_string()),
        database: DatabaseConfig::InMemory,
        // The Prometheus recorder is process-global; only one router per process may install it
        enable_metrics: false,
        ..Default::default()
    };
    config.trainer.api_token = Some("test-token".to_string());
    config.trainer.request_timeout = Duration::from_secs(5);
    config
}

pub fn test_app_state(config: Config) -> AppState {
    AppState::builder()
        .config(config)
        .store(Arc::new(InMemoryProjects::new()))
        .trainer(Arc::new(MockTrainingService::new()))
        .build()
}

/// `Cookie` header value carrying a valid session for `user_id`.
pub fn session_cookie(config: &Config, user_id: UserId) -> String {
    let user = CurrentUser { id: user_id };
    let token = session::create_session_token(&user, chrono::Duration::hours(1), config).expect("Failed to create session token");
    format!("{}={token}", config.auth.session.cookie_name)
}

/// Training service double that records every request and replays queued responses.
///
/// Clones share state, so a test can keep a handle after moving one into [`AppState`].
#[derive(Clone, Default)]
pub struct MockTrainingService {
    responses: Arc<Mutex<VecDeque<Result<ExternalJobId, SubmitError>>>>,
    calls: Arc<Mutex<Vec<TrainingRequest>>>,
    delay: Option<Duration>,
}

impl MockTrainingService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, job_id: &str) {
        self.responses.lock().push_back(Ok(job_id.to_string()));
    }

    pub fn push_err(&self, err: SubmitError) {
        self.responses.lock().push_back(Err(err));
    }

    pub fn calls(&self) -> Vec<TrainingRequest> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl TrainingService for MockTrainingService {
    async fn submit(&self, request: &TrainingRequest) -> Result<ExternalJobId, SubmitError> {
        let call_number = {
            let mut calls = self.calls.lock();
            calls.push(request.clone());
            calls.len()
        };

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        // Unscripted calls succeed with a generated id
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("mock-job-{call_number}")))
    }
}

/// Consume one request, head and body, so closing the socket does not reset it.
async fn read_request(stream: &mut TcpStream) {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        data.extend_from_slice(&buf[..n]);
        if let Some(end) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&data[..end]).to_ascii_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if data.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

/// Training service base URL whose every answer is a `201` that promises 100 body bytes
/// and hangs up after a few.
pub async fn truncated_created_upstream() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("Failed to bind listener");
    let addr = listener.local_addr().expect("Failed to read listener address");
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            read_request(&mut stream).await;
            let _ = stream
                .write_all(
                    b"HTTP/1.1 201 Created\r\ncontent-type: application/json\r\ncontent-length: 100\r\n\r\n{\"id\":",
                )
                .await;
            let _ = stream.shutdown().await;
        }
    });
    Url::parse(&format!("http://{addr}")).expect("Failed to build upstream URL")
}

/// Store that behaves like `inner` except for the writes it is told to fail.
#[derive(Clone)]
pub struct FailingStore {
    inner: InMemoryProjects,
    fail_processing: bool,
    fail_terminal: bool,
}

/// Recording a submitted job always fails.
pub fn failing_store(inner: InMemoryProjects) -> FailingStore {
    FailingStore {
        inner,
        fail_processing: true,
        fail_terminal: false,
    }
}

/// Recording a job's outcome always fails.
pub fn failing_terminal_store(inner: InMemoryProjects) -> FailingStore {
    FailingStore {
        inner,
        fail_processing: false,
        fail_terminal: true,
    }
}

#[async_trait]
impl ProjectStore for FailingStore {
    async fn create(&self, request: &ProjectCreateDBRequest) -> DbResult<Project> {
        self.inner.create(request).await
    }

    async fn get_by_id(&self, id: ProjectId) -> DbResult<Option<Project>> {
        self.inner.get_by_id(id).await
    }

    async fn find_eligible(&self, owner_id: UserId, id: ProjectId) -> DbResult<Project> {
        self.inner.find_eligible(owner_id, id).await
    }

    async fn claim_submission(&self, owner_id: UserId, id: ProjectId, lease: chrono::Duration) -> DbResult<Project> {
        self.inner.claim_submission(owner_id, id, lease).await
    }

    async fn release_submission(&self, id: ProjectId, claimed_at: DateTime<Utc>) -> DbResult<()> {
        self.inner.release_submission(id, claimed_at).await
    }

    async fn transition_to_processing(&self, id: ProjectId, external_job_id: &str) -> DbResult<Project> {
        if self.fail_processing {
            return Err(DbError::Other(anyhow::anyhow!("connection reset while recording job")));
        }
        self.inner.transition_to_processing(id, external_job_id).await
    }

    async fn transition_to_terminal(
        &self,
        external_job_id: &str,
        outcome: TerminalOutcome,
        artifact_reference: Option<&str>,
    ) -> DbResult<Project> {
        if self.fail_terminal {
            return Err(DbError::Other(anyhow::anyhow!("connection reset while recording outcome")));
        }
        self.inner
            .transition_to_terminal(external_job_id, outcome, artifact_reference)
            .await
    }
}

/// A router over an in-memory store and a mock training service.
///
/// `store` is the underlying in-memory store even when the router was given a wrapper.
pub struct TestApp {
    pub server: TestServer,
    pub store: InMemoryProjects,
    pub trainer: MockTrainingService,
    pub config: Config,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_store(config, |store| Arc::new(store) as Arc<dyn ProjectStore>)
    }

    /// Serve the router through a store built around the in-memory one.
    pub fn with_store(config: Config, wrap: impl FnOnce(InMemoryProjects) -> Arc<dyn ProjectStore>) -> Self {
        let store = InMemoryProjects::new();
        let trainer = MockTrainingService::new();
        let state = AppState::builder()
            .config(config.clone())
            .store(wrap(store.clone()))
            .trainer(Arc::new(trainer.clone()))
            .build();
        let router = crate::build_router(&state).expect("Failed to build router");
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            trainer,
            config,
        }
    }
}

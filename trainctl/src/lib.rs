//! # trainctl: training job orchestration for personalised image models
//!
//! `trainctl` sits between a photo-upload product and a remote model training service. A
//! customer creates a project, pays for it and uploads photos of a subject; `trainctl` turns
//! that project into a fine-tuning job, submits it, and tracks it until the training service
//! calls back with the result.
//!
//! ## Request Flow
//!
//! **Start training** (`POST /api/projects/{id}/train`). The caller is authenticated from a
//! session cookie or a trusted proxy header. The project must belong to the caller, be paid,
//! and never have been trained. The service takes a short submission lease on the project so
//! that concurrent requests submit at most one job, normalises the subject's instance class,
//! submits the job, and records `processing` together with the job id the service returned.
//! See [`training::service`].
//!
//! **Completion callback** (`POST /api/webhooks/completed`). The training service reports the
//! job's final status. After the callback is verified it is applied with one conditional write
//! that moves the project from `processing` to `ready` or `failed`. Redelivered and unknown
//! callbacks are acknowledged without changing anything. See [`training::reconciler`].
//!
//! ## Storage
//!
//! Project state lives behind the [`db::handlers::ProjectStore`] trait. Production deployments
//! use PostgreSQL (migrations run on startup); development and tests can use the in-memory
//! store.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use trainctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = trainctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!     trainctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.
pub mod api;
pub mod auth;
pub mod callbacks;
pub mod config;
pub mod db;
pub mod errors;
mod openapi;
pub mod telemetry;
pub mod training;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use axum::{
    Router,
    http::{self, HeaderValue},
    routing::{get, post},
};
use axum_prometheus::PrometheusMetricLayer;
use bon::Builder;
pub use config::Config;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::{Level, debug, info, instrument, warn};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use crate::{
    config::{CallbackVerification, DatabaseConfig},
    db::handlers::{InMemoryProjects, ProjectStore, Projects},
    openapi::ApiDoc,
    training::client::{TrainingClient, TrainingService},
};

pub use types::{ProjectId, UserId};

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .store(Arc::new(Projects::new(pool)))
///     .trainer(Arc::new(TrainingClient::new(&config.trainer)?))
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ProjectStore>,
    pub trainer: Arc<dyn TrainingService>,
}

/// Get the trainctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Connect to the configured database and run migrations, or fall back to the in-memory store.
async fn setup_store(config: &Config) -> anyhow::Result<(Arc<dyn ProjectStore>, Option<PgPool>)> {
    match &config.database {
        DatabaseConfig::InMemory => {
            warn!("Using in-memory project store: state will be lost on shutdown");
            Ok((Arc::new(InMemoryProjects::new()), None))
        }
        DatabaseConfig::External { url, pool } => {
            info!("Using external database");
            let mut options = PgPoolOptions::new()
                .max_connections(pool.max_connections)
                .min_connections(pool.min_connections)
                .acquire_timeout(Duration::from_secs(pool.acquire_timeout_secs));
            // 0 disables the timeout
            if pool.idle_timeout_secs > 0 {
                options = options.idle_timeout(Duration::from_secs(pool.idle_timeout_secs));
            }
            if pool.max_lifetime_secs > 0 {
                options = options.max_lifetime(Duration::from_secs(pool.max_lifetime_secs));
            }

            let pool = options.connect(url).await?;
            migrator().run(&pool).await?;

            Ok((Arc::new(Projects::new(pool.clone())), Some(pool)))
        }
    }
}

/// Create CORS layer from configuration
fn create_cors_layer(config: &Config) -> anyhow::Result<CorsLayer> {
    let cors_config = &config.auth.security.cors;

    let allow_origin = if cors_config.allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let mut origins = Vec::new();
        for origin in &cors_config.allowed_origins {
            origins.push(origin.parse::<HeaderValue>()?);
        }
        AllowOrigin::list(origins)
    };

    let mut cors = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([http::Method::GET, http::Method::POST])
        .allow_headers([http::header::CONTENT_TYPE]);

    // Credentials cannot be combined with a wildcard origin
    if cors_config.allow_credentials && !cors_config.allowed_origins.iter().any(|o| o == "*") {
        cors = cors.allow_credentials(true);
    }

    if let Some(max_age) = cors_config.max_age {
        cors = cors.max_age(Duration::from_secs(max_age));
    }

    Ok(cors)
}

/// Build the main application router with all endpoints and middleware.
///
/// - `/api/*`: project and callback endpoints
/// - `/healthz`: liveness probe
/// - `/docs`: API reference
/// - `/internal/metrics`: Prometheus metrics, when enabled
///
/// # Errors
///
/// Returns an error if CORS configuration is invalid.
#[instrument(skip_all)]
pub fn build_router(state: &AppState) -> anyhow::Result<Router> {
    let api_routes = Router::new()
        .route("/projects/{id}", get(api::handlers::projects::get_project))
        .route("/projects/{id}/train", post(api::handlers::projects::start_training))
        .route("/webhooks/completed", post(api::handlers::callbacks::completion_callback))
        .with_state(state.clone());

    let router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        .route("/openapi.json", get(|| async { axum::Json(ApiDoc::openapi()) }))
        .nest("/api", api_routes)
        .merge(Scalar::with_url("/docs", ApiDoc::openapi()));

    let cors_layer = create_cors_layer(&state.config)?;
    let mut router = router.layer(cors_layer);

    if state.config.enable_metrics {
        let (prometheus_layer, metric_handle) = PrometheusMetricLayer::pair();
        router = router
            .route("/internal/metrics", get(|| async move { metric_handle.render() }))
            .layer(prometheus_layer);
    }

    let router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    );

    Ok(router)
}

/// Main application struct that owns all resources and lifecycle.
///
/// 1. **Create**: [`Application::new`] connects the store, runs migrations and builds the router
/// 2. **Serve**: [`Application::serve`] binds to a TCP port and handles requests until the
///    shutdown future resolves, then closes the database pool and flushes telemetry
pub struct Application {
    router: Router,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting trainctl with configuration: {:#?}", config);

        if matches!(config.callbacks.verification, CallbackVerification::None) {
            warn!("Completion callbacks are not verified; anyone who can reach this service can complete jobs");
        }

        let (store, pool) = setup_store(&config).await?;
        let trainer = Arc::new(TrainingClient::new(&config.trainer)?);

        let app_state = AppState::builder().config(config.clone()).store(store).trainer(trainer).build();
        let router = build_router(&app_state)?;

        Ok(Self { router, config, pool })
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "trainctl listening on http://{}, callbacks expected at {}",
            bind_addr,
            self.config.completion_callback_url()
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}

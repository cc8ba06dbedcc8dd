//! FeedbackJar REST API
//!
//! HTTP API layer for FeedbackJar analytics, built with Axum.
//!
//! Every route below `/api/v1` is scoped by the `project_id` path segment.
//!
//! # Endpoints
//!
//! ## Events
//! - `POST /api/v1/projects/:project_id/events` - Track one event
//! - `POST /api/v1/projects/:project_id/events/batch` - Track a batch of events
//!
//! ## Charts
//! - `GET /api/v1/projects/:project_id/charts` - List charts
//! - `POST /api/v1/projects/:project_id/charts` - Create a chart
//! - `GET /api/v1/projects/:project_id/charts/:chart_id` - Get a chart
//! - `PUT /api/v1/projects/:project_id/charts/:chart_id` - Update a chart
//! - `DELETE /api/v1/projects/:project_id/charts/:chart_id` - Delete a chart
//!
//! ## Chart Data
//! - `GET /api/v1/projects/:project_id/charts/:chart_id/data` - Render a chart (json or csv)
//! - `POST /api/v1/projects/:project_id/charts/preview` - Render an unsaved spec
//! - `POST /api/v1/projects/:project_id/charts/explain` - Show compiled SQL
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! # Example
//!
//! ```rust,ignore
//! use feedbackjar::api::{serve, AppState};
//! use feedbackjar::config::Config;
//! use feedbackjar::storage::Database;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!     let database = Database::open(&config.storage)?;
//!
//!     let state = AppState::new(database, config.api.clone(), config.query.time_range_policy);
//!     serve(state, &config.api).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use state::AppState;

use axum::{
    http::{HeaderValue, Method},
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;

/// Build the API router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Event routes
        .route("/projects/:project_id/events", post(routes::events::track_event))
        .route("/projects/:project_id/events/batch", post(routes::events::track_batch))
        // Chart routes
        .route("/projects/:project_id/charts", get(routes::charts::list_charts))
        .route("/projects/:project_id/charts", post(routes::charts::create_chart))
        .route("/projects/:project_id/charts/:chart_id", get(routes::charts::get_chart))
        .route("/projects/:project_id/charts/:chart_id", put(routes::charts::update_chart))
        .route("/projects/:project_id/charts/:chart_id", delete(routes::charts::delete_chart))
        // Chart data routes
        .route(
            "/projects/:project_id/charts/:chart_id/data",
            get(routes::chart_data::chart_data),
        )
        .route(
            "/projects/:project_id/charts/preview",
            post(routes::chart_data::preview_chart),
        )
        .route(
            "/projects/:project_id/charts/explain",
            post(routes::chart_data::explain_chart),
        );

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let cors = cors_layer(&state.config);
    let shared_state = Arc::new(state);

    Router::new()
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(shared_state)
}

/// CORS for the configured dashboard origins; permissive when none are set
fn cors_layer(config: &ApiConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
}

/// Start the API server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("FeedbackJar API listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("FeedbackJar API shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}

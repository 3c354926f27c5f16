//! HTTP routes for the Roll Call service.
//!
//! Defines the Axum router and application state.

use crate::display::InMemoryBoard;
use crate::handlers;
use crate::observability::HealthState;
use crate::services::AttendanceService;
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool (readiness checks).
    pub pool: SqlitePool,

    /// Session orchestration and record corrections.
    pub service: Arc<AttendanceService>,

    /// Board served to projector pages, when the display is in-process.
    pub board: Option<Arc<InMemoryBoard>>,

    /// Liveness/readiness flags.
    pub health: Arc<HealthState>,
}

/// Build the application routes.
///
/// Creates an Axum router with:
/// - `/health`, `/ready`, `/metrics` - operational endpoints, unversioned
/// - `/api/v1/session/open`, `/api/v1/session/close`, `/api/v1/session`
/// - `/api/v1/submissions`, `/api/v1/participants`
/// - `/api/v1/exports`, `/api/v1/attendance/{present,excused,remove}`
/// - `/api/v1/boards/:channel_id`
/// - TraceLayer for request logging
/// - 30 second request timeout
pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let api_routes = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/api/v1/session", get(handlers::session_status))
        .route("/api/v1/session/open", post(handlers::open_session))
        .route("/api/v1/session/close", post(handlers::close_session))
        .route("/api/v1/submissions", post(handlers::submit_attendance))
        .route("/api/v1/participants", post(handlers::register_participant))
        .route("/api/v1/exports", get(handlers::export_attendance))
        .route("/api/v1/attendance/present", post(handlers::mark_present))
        .route("/api/v1/attendance/excused", post(handlers::mark_excused))
        .route("/api/v1/attendance/remove", post(handlers::remove_attendance))
        .route("/api/v1/boards/:channel_id", get(handlers::get_board))
        .with_state(state);

    // Metrics route with its own state
    let metrics_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .with_state(metrics_handle);

    // Closing a session waits for rotation and a database write; 30s is
    // generous for both.
    api_routes
        .merge(metrics_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

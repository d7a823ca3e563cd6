//! Route table assembly.

use crate::handlers;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

/// Build the API router with all endpoints and middleware.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/health/live", get(handlers::liveness_check))
        .route("/health/ready", get(handlers::readiness_check))
        .route("/v1/route", post(handlers::route_task))
        .route("/v1/route/subtasks", post(handlers::route_subtasks))
        .route("/v1/outcomes", post(handlers::record_outcome))
        .route("/v1/agents/health", get(handlers::agent_health))
        .route("/v1/analytics", get(handlers::routing_analytics))
        .route("/v1/analytics/learning", get(handlers::learning_analytics))
        .route("/v1/optimize", post(handlers::run_optimization))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

//! HTTP request handlers for the routing API.

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use router_core::{
    AgentHealthStatus, EnhancedRoutingResult, RoutingOptimization, TaskContext,
};
use router_engine::{
    LearningAnalytics, OutcomeReport, RecordAck, RoutingAnalytics, SubtaskRouting,
};
use serde::{Deserialize, Serialize};
use tracing::instrument;

/// Minimal health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Crate version.
    pub version: String,
}

/// Query parameters for the analytics endpoint.
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    /// Window in hours; defaults to 24.
    #[serde(default = "default_window_hours")]
    pub window_hours: u32,
}

fn default_window_hours() -> u32 {
    24
}

/// Service health endpoint.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Liveness probe.
pub async fn liveness_check() -> impl IntoResponse {
    (StatusCode::OK, "alive")
}

/// Readiness probe: ready once at least one agent is registered.
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.is_empty() {
        (StatusCode::SERVICE_UNAVAILABLE, "no agents registered")
    } else {
        (StatusCode::OK, "ready")
    }
}

/// Route a task to the best available agent.
#[instrument(skip(state, task), fields(task_type = %task.task_type))]
pub async fn route_task(
    State(state): State<AppState>,
    Json(task): Json<TaskContext>,
) -> Result<Json<EnhancedRoutingResult>, ApiError> {
    let timeout = state.config.get().server.request_timeout;
    let result = state.router.route_with_timeout(&task, timeout).await?;
    Ok(Json(result))
}

/// Route a batch of independent subtasks concurrently.
#[instrument(skip(state, subtasks), fields(count = subtasks.len()))]
pub async fn route_subtasks(
    State(state): State<AppState>,
    Json(subtasks): Json<Vec<TaskContext>>,
) -> Result<Json<SubtaskRouting>, ApiError> {
    Ok(Json(state.router.route_subtasks(subtasks).await))
}

/// Record a task outcome.
#[instrument(skip(state, report), fields(routing_id = %report.routing_id))]
pub async fn record_outcome(
    State(state): State<AppState>,
    Json(report): Json<OutcomeReport>,
) -> Result<Json<RecordAck>, ApiError> {
    let ack = state.recorder.record(report).await?;
    Ok(Json(ack))
}

/// Health summaries for every registered agent.
#[instrument(skip(state))]
pub async fn agent_health(
    State(state): State<AppState>,
) -> Result<Json<Vec<AgentHealthStatus>>, ApiError> {
    Ok(Json(state.health.statuses(Utc::now()).await))
}

/// Routing analytics over a window.
#[instrument(skip(state))]
pub async fn routing_analytics(
    State(state): State<AppState>,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<RoutingAnalytics>, ApiError> {
    let analytics = state
        .analytics
        .routing(query.window_hours, Utc::now())
        .await?;
    Ok(Json(analytics))
}

/// Learning analytics.
#[instrument(skip(state))]
pub async fn learning_analytics(
    State(state): State<AppState>,
) -> Result<Json<LearningAnalytics>, ApiError> {
    Ok(Json(state.analytics.learning(Utc::now()).await?))
}

/// Run a full routing-weight optimization. Idempotent per minute.
#[instrument(skip(state))]
pub async fn run_optimization(
    State(state): State<AppState>,
) -> Result<Json<RoutingOptimization>, ApiError> {
    Ok(Json(state.learning.optimize(Utc::now()).await?))
}

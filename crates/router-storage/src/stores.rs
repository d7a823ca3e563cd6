//! Store traits and aggregate row shapes.
//!
//! Each trait covers one ownership domain from the data model; the
//! routing path only ever reads aggregates, while writes go through the
//! owning component. Implementations map their backend failures onto
//! `RouterError::PersistenceUnavailable` so callers can apply the
//! degrade-don't-abort policy uniformly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use router_core::{
    AgentId, AgentSpecialization, PerformanceScore, RouterResult, RoutingId, RoutingOptimization,
    RoutingRecord, SuccessPrediction, TaskComplexity, TaskOutcome,
};
use router_registry::Agent;
use router_resilience::CircuitBreakerSnapshot;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregates over one agent's routing records.
#[derive(Debug, Clone, Default)]
pub struct AgentStats {
    /// Records in the window.
    pub total_requests: u64,
    /// Mean success over resolved records, when any exist.
    pub success_rate: Option<f64>,
    /// Mean execution time in milliseconds.
    pub avg_execution_ms: Option<f64>,
    /// Mean actual cost in cents.
    pub avg_cost_cents: Option<f64>,
    /// 95th percentile execution time in milliseconds.
    pub p95_execution_ms: Option<f64>,
}

/// Aggregates over one `(agent, task_type, complexity)` pairing.
#[derive(Debug, Clone, Default)]
pub struct PairingStats {
    /// Records in the window.
    pub sample_size: u64,
    /// Mean success over resolved records.
    pub success_rate: Option<f64>,
    /// Mean execution time in milliseconds.
    pub avg_execution_ms: Option<f64>,
    /// Mean actual cost in cents.
    pub avg_cost_cents: Option<f64>,
}

/// Result of resolving a routing record with its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The record was updated.
    Updated,
    /// The record exists but was already resolved; no change was made.
    AlreadyResolved,
    /// No record matches the routing id.
    NotFound,
}

/// One aggregation group feeding the weight optimizer.
#[derive(Debug, Clone)]
pub struct PerformanceGroup {
    /// The agent.
    pub agent_id: AgentId,
    /// Task type tag.
    pub task_type: String,
    /// Task complexity.
    pub complexity: TaskComplexity,
    /// Outcomes in the group.
    pub sample_size: u64,
    /// Mean success score.
    pub avg_success: f64,
    /// Success score standard deviation.
    pub std_success: f64,
    /// Mean completion time in seconds.
    pub avg_time_seconds: f64,
    /// Mean user satisfaction (3.0 substituted when unrated).
    pub avg_satisfaction: f64,
}

impl PerformanceGroup {
    /// Key grouping this entry with others of the same kind.
    #[must_use]
    pub fn task_key(&self) -> String {
        format!("{}_{}", self.task_type, self.complexity.as_str())
    }
}

/// Point-in-time performance snapshot row for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSnapshotRow {
    /// The agent.
    pub agent_id: AgentId,
    /// When the snapshot was taken.
    pub snapshot_time: DateTime<Utc>,
    /// Score breakdown at snapshot time.
    pub score: PerformanceScore,
    /// In-flight requests at snapshot time.
    pub active_requests: u32,
    /// Load band at snapshot time.
    pub load_level: String,
    /// Predictive failure score at snapshot time.
    pub predictive_failure_score: f64,
    /// Additional context.
    pub metadata: serde_json::Value,
}

/// Window totals for the analytics surface.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverviewStats {
    /// Routing decisions in the window.
    pub total_routings: u64,
    /// Mean routing latency in milliseconds.
    pub avg_routing_ms: Option<f64>,
    /// Mean success over resolved records.
    pub success_rate: Option<f64>,
    /// Distinct agents that received traffic.
    pub unique_agents: u64,
}

/// Per-agent analytics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentAnalytics {
    /// The agent.
    pub agent_id: AgentId,
    /// Routing decisions in the window.
    pub routing_count: u64,
    /// Mean routing latency in milliseconds.
    pub avg_routing_ms: Option<f64>,
    /// Mean execution time in milliseconds.
    pub avg_execution_ms: Option<f64>,
    /// Mean success over resolved records.
    pub success_rate: Option<f64>,
    /// Mean actual cost in cents.
    pub avg_cost_cents: Option<f64>,
}

/// Per-task-type analytics row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTypeAnalytics {
    /// Task type tag.
    pub task_type: String,
    /// Task complexity.
    pub complexity: TaskComplexity,
    /// Routing decisions in the window.
    pub count: u64,
    /// Mean routing latency in milliseconds.
    pub avg_routing_ms: Option<f64>,
    /// Mean success over resolved records.
    pub success_rate: Option<f64>,
}

/// Routing records, their aggregates, and performance snapshots.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Insert a freshly emitted routing record.
    async fn insert_routing_record(&self, record: &RoutingRecord) -> RouterResult<()>;

    /// Resolve a routing record with its reported outcome. Only records
    /// created within the last minute are eligible; a second resolution
    /// attempt is a no-op.
    async fn resolve_routing_record(
        &self,
        routing_id: RoutingId,
        agent_id: AgentId,
        success: bool,
        execution_time_ms: f64,
        cost_actual_cents: Option<i64>,
        now: DateTime<Utc>,
    ) -> RouterResult<ResolveOutcome>;

    /// Fetch one routing record.
    async fn get_routing_record(&self, routing_id: RoutingId) -> RouterResult<Option<RoutingRecord>>;

    /// Aggregates over one agent's records since the given instant.
    async fn agent_stats(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> RouterResult<AgentStats>;

    /// Aggregates over one pairing since the given instant.
    async fn pairing_stats(
        &self,
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        since: DateTime<Utc>,
    ) -> RouterResult<PairingStats>;

    /// Recent resolved successes/failures for an agent, newest first,
    /// used by the predictive failure estimator.
    async fn recent_execution_results(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RouterResult<Vec<bool>>;

    /// Insert a performance snapshot row.
    async fn insert_performance_snapshot(&self, row: &PerformanceSnapshotRow) -> RouterResult<()>;

    /// Window totals.
    async fn routing_overview(&self, since: DateTime<Utc>) -> RouterResult<OverviewStats>;

    /// Per-agent breakdown, ordered by routing count descending.
    async fn per_agent_analytics(&self, since: DateTime<Utc>) -> RouterResult<Vec<AgentAnalytics>>;

    /// Per-task-type breakdown, ordered by count descending.
    async fn task_type_analytics(
        &self,
        since: DateTime<Utc>,
    ) -> RouterResult<Vec<TaskTypeAnalytics>>;
}

/// Task outcomes.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Insert a task outcome, returning its row id.
    async fn insert_outcome(&self, outcome: &TaskOutcome) -> RouterResult<Uuid>;

    /// Recent outcomes, newest first, for warming the learning ring buffer.
    async fn recent_outcomes(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RouterResult<Vec<TaskOutcome>>;

    /// Aggregated outcome groups for the optimizer; only groups with at
    /// least `min_samples` outcomes are returned.
    async fn aggregate_performance(
        &self,
        since: DateTime<Utc>,
        min_samples: u32,
    ) -> RouterResult<Vec<PerformanceGroup>>;

    /// First outcome for the pairing recorded inside the window, used for
    /// prediction validation.
    async fn outcome_for_pairing(
        &self,
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RouterResult<Option<(Uuid, f64)>>;
}

/// Learned artifacts: specializations, optimizations, predictions, metrics.
#[async_trait]
pub trait LearningStore: Send + Sync {
    /// Insert or refresh a specialization, unique on
    /// `(agent_id, specialization_type)`.
    async fn upsert_specialization(&self, spec: &AgentSpecialization) -> RouterResult<()>;

    /// All active specializations.
    async fn active_specializations(&self) -> RouterResult<Vec<AgentSpecialization>>;

    /// Install a new optimization snapshot: deactivate the prior active
    /// row and insert the new one in the same transaction.
    async fn install_optimization(&self, optimization: &RoutingOptimization) -> RouterResult<()>;

    /// The currently active optimization snapshot.
    async fn active_optimization(&self) -> RouterResult<Option<RoutingOptimization>>;

    /// Recent optimization snapshots, newest first.
    async fn optimization_history(&self, limit: u32) -> RouterResult<Vec<RoutingOptimization>>;

    /// Store an emitted prediction.
    async fn insert_prediction(&self, prediction: &SuccessPrediction) -> RouterResult<()>;

    /// Predictions that have not been validated yet, oldest first.
    async fn unvalidated_predictions(&self, limit: u32) -> RouterResult<Vec<SuccessPrediction>>;

    /// Fill in a prediction's validation fields.
    async fn mark_prediction_validated(
        &self,
        prediction_id: Uuid,
        accuracy: f64,
        outcome_id: Uuid,
        validated_at: DateTime<Utc>,
    ) -> RouterResult<()>;

    /// Mean prediction accuracy over validated predictions in the window.
    async fn prediction_accuracy(&self, since: DateTime<Utc>) -> RouterResult<Option<f64>>;

    /// Append a learning metric observation.
    async fn insert_learning_metric(
        &self,
        name: &str,
        value: f64,
        metadata: serde_json::Value,
    ) -> RouterResult<()>;
}

/// Agents and circuit breaker rows.
#[async_trait]
pub trait AgentStore: Send + Sync {
    /// Insert or replace an agent row with its capability links.
    async fn upsert_agent(&self, agent: &Agent) -> RouterResult<()>;

    /// Load every agent row.
    async fn load_agents(&self) -> RouterResult<Vec<Agent>>;

    /// Insert or replace a circuit breaker row.
    async fn upsert_breaker(&self, snapshot: &CircuitBreakerSnapshot) -> RouterResult<()>;

    /// Load every circuit breaker row.
    async fn load_breakers(&self) -> RouterResult<Vec<CircuitBreakerSnapshot>>;

    /// Breaker rows that are not quietly CLOSED (open, half-open, or
    /// carrying failures), for the analytics surface.
    async fn breaker_report(&self) -> RouterResult<Vec<CircuitBreakerSnapshot>>;
}

/// Everything the engine needs from a durable backend.
pub trait Storage: MetricsStore + OutcomeStore + LearningStore + AgentStore {}

impl<T: MetricsStore + OutcomeStore + LearningStore + AgentStore> Storage for T {}

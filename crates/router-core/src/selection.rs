//! Selection results and health reporting types.

use crate::score::PerformanceScore;
use crate::types::{AgentId, AgentStatus, LoadLevel, RoutingId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a successful agent selection. Immutable once emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSelection {
    /// The chosen agent.
    pub agent_id: AgentId,
    /// Display name of the chosen agent.
    pub agent_name: String,
    /// Confidence in the selection, 0.0-1.0.
    pub confidence: f64,
    /// Human-readable selection rationale.
    pub reason: String,
    /// Up to three fallback agents, best first.
    pub fallback_agents: Vec<AgentId>,
    /// Estimated completion time in seconds.
    pub estimated_completion_seconds: f64,
    /// Estimated cost in cents.
    pub estimated_cost_cents: i64,
    /// Score breakdown and selection-time context.
    pub metadata: SelectionMetadata,
}

/// Context captured at selection time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionMetadata {
    /// Score breakdown for the chosen agent.
    pub score_breakdown: PerformanceScore,
    /// Load level of the chosen agent when selected.
    pub load_level: LoadLevel,
    /// UTC timestamp of the selection.
    pub selected_at: DateTime<Utc>,
    /// Number of candidates that were scored.
    pub candidates_considered: usize,
    /// Set when a learning override replaced the base pick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_type: Option<String>,
}

/// Learning-derived context attached to an enhanced routing result.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningInsights {
    /// Which override fired, if any (`"specialization_match"` or `"routing_weight"`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimization_type: Option<String>,
    /// Advantage of the specialized agent over the base pick.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub performance_advantage: Option<f64>,
    /// Weight gain from a routing-weight swap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight_improvement: Option<f64>,
    /// True when the prediction-threshold fallback replaced the pick.
    #[serde(default)]
    pub alternative_selected: bool,
}

/// Full routing response: base selection plus learning enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnhancedRoutingResult {
    /// Identifier joining this decision to its eventual outcome report.
    pub routing_id: RoutingId,
    /// The (possibly overridden) selection.
    pub selection: AgentSelection,
    /// Success forecast for the chosen pairing, when learning is enabled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction: Option<crate::outcome::SuccessPrediction>,
    /// Learning-derived context.
    #[serde(default)]
    pub learning_insights: LearningInsights,
    /// Confidence in the applied optimization, 0.0 when none fired.
    pub optimization_confidence: f64,
    /// Other viable agents, best first.
    pub alternative_agents: Vec<AgentId>,
    /// Combined human-readable explanation.
    pub explanation: String,
    /// Time spent routing, in milliseconds.
    pub routing_time_ms: f64,
}

/// Point-in-time health summary for one agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentHealthStatus {
    /// The agent.
    pub agent_id: AgentId,
    /// Display name.
    pub name: String,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Current load band.
    pub load_level: LoadLevel,
    /// Success rate over the recent window, 0.0-1.0.
    pub success_rate: f64,
    /// Error rate over the recent window, 0.0-1.0.
    pub error_rate: f64,
    /// 95th percentile response time in milliseconds.
    pub p95_response_ms: f64,
    /// Average cost per request in cents.
    pub cost_per_request_cents: f64,
    /// When health was last evaluated.
    pub last_health_check: DateTime<Utc>,
    /// Likelihood of near-term failure, 0.0-1.0.
    pub predictive_failure_score: f64,
    /// In-flight requests over capacity, 0.0-1.0 (may exceed 1.0 briefly).
    pub capacity_utilization: f64,
}

//! Durable records: routing decisions, outcomes, and learned artifacts.

use crate::task::TaskComplexity;
use crate::types::{AgentId, RoutingId, WeightMatrix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// One row per routing decision, updated exactly once when the outcome lands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingRecord {
    /// Identifier joining selection and outcome.
    pub routing_id: RoutingId,
    /// The chosen agent.
    pub agent_id: AgentId,
    /// Task type tag at selection time.
    pub task_type: String,
    /// Task complexity at selection time.
    pub complexity: TaskComplexity,
    /// Overall score of the chosen agent at selection time.
    pub selection_score: f64,
    /// Time spent routing, in milliseconds.
    pub routing_time_ms: f64,
    /// Whether the execution succeeded; `None` until the outcome is reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_success: Option<bool>,
    /// Execution time in milliseconds, once reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<f64>,
    /// Actual cost in cents, once reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_actual_cents: Option<i64>,
    /// Embedded task metadata.
    #[serde(default)]
    pub task_metadata: serde_json::Value,
    /// When the decision was made.
    pub created_at: DateTime<Utc>,
}

impl RoutingRecord {
    /// Whether the outcome has been reported.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.execution_success.is_some()
    }
}

/// Structured task execution outcome used for learning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskOutcome {
    /// The routing decision this outcome resolves.
    pub routing_id: RoutingId,
    /// The agent that executed the task.
    pub agent_id: AgentId,
    /// Task type tag.
    pub task_type: String,
    /// Task complexity.
    pub complexity: TaskComplexity,
    /// Derived success score, 0.0-1.0.
    pub success_score: f64,
    /// Wall-clock completion time in seconds.
    pub completion_seconds: f64,
    /// Named quality measurements, each 0.0-1.0.
    #[serde(default)]
    pub quality_metrics: BTreeMap<String, f64>,
    /// Optional user satisfaction rating, 1-5.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_satisfaction: Option<f64>,
    /// Errors observed during execution.
    #[serde(default)]
    pub error_count: u32,
    /// Retries performed during execution.
    #[serde(default)]
    pub retry_attempts: u32,
    /// Actual cost in cents, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_actual_cents: Option<i64>,
    /// Opaque execution context.
    #[serde(default)]
    pub context_metadata: serde_json::Value,
    /// When the outcome was recorded.
    pub recorded_at: DateTime<Utc>,
}

impl TaskOutcome {
    /// Derive the success score from a boolean result and optional
    /// quality metrics: the boolean maps to 1.0/0.0 and is averaged with
    /// the mean quality when any metrics are present.
    #[must_use]
    pub fn derive_success_score(success: bool, quality_metrics: &BTreeMap<String, f64>) -> f64 {
        let base = if success { 1.0 } else { 0.0 };
        if quality_metrics.is_empty() {
            return base;
        }
        let mean_quality =
            quality_metrics.values().sum::<f64>() / quality_metrics.len() as f64;
        (base + mean_quality) / 2.0
    }

    /// Key grouping this outcome with others of the same kind.
    #[must_use]
    pub fn task_key(&self) -> String {
        format!("{}_{}", self.task_type, self.complexity.as_str())
    }
}

/// A discovered agent specialization.
///
/// Unique per `(agent_id, specialization_type)`; superseded rows are
/// marked inactive rather than deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSpecialization {
    /// The specialized agent.
    pub agent_id: AgentId,
    /// Derived key `"<task_type>_<complexity>"`.
    pub specialization_type: String,
    /// Task types covered by this specialization.
    pub task_types: Vec<String>,
    /// Complexities covered by this specialization.
    pub complexity_preferences: Vec<TaskComplexity>,
    /// Confidence in the finding, 0.0-1.0.
    pub confidence: f64,
    /// Mean success advantage over the agent's own overall mean.
    pub performance_advantage: f64,
    /// Outcomes backing the finding.
    pub sample_size: u64,
    /// When first discovered.
    pub discovered_at: DateTime<Utc>,
    /// When last re-confirmed.
    pub last_validated: DateTime<Utc>,
    /// False once superseded.
    pub is_active: bool,
}

impl AgentSpecialization {
    /// Whether this specialization covers the given pairing.
    #[must_use]
    pub fn matches(&self, task_type: &str, complexity: TaskComplexity) -> bool {
        self.is_active
            && self.task_types.iter().any(|t| t == task_type)
            && self.complexity_preferences.contains(&complexity)
    }
}

/// A versioned snapshot of the full routing weight matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingOptimization {
    /// Row identity.
    pub id: Uuid,
    /// Human-readable version tag, distinct from the row id.
    pub optimization_version: String,
    /// The full weight matrix.
    pub agent_weights: WeightMatrix,
    /// Expected improvement over the prior matrix, percent.
    pub performance_improvement: f64,
    /// Conservative bound of the improvement estimate.
    pub confidence_lower: f64,
    /// Optimistic bound of the improvement estimate.
    pub confidence_upper: f64,
    /// Algorithm identifier.
    pub optimization_method: String,
    /// Aggregated sample count that entered the estimators.
    pub sample_size: u64,
    /// When the snapshot was installed.
    pub applied_at: DateTime<Utc>,
    /// Days the snapshot is expected to stay valid.
    pub validation_period_days: u32,
    /// Exactly one snapshot is active at a time.
    pub is_active: bool,
}

/// A stored success forecast for one agent/task pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuccessPrediction {
    /// Row identity.
    pub id: Uuid,
    /// The agent being forecast.
    pub agent_id: AgentId,
    /// Task type tag.
    pub task_type: String,
    /// Task complexity.
    pub complexity: TaskComplexity,
    /// Predicted success rate, 0.0-1.0.
    pub predicted_rate: f64,
    /// Lower bound of the confidence interval.
    pub confidence_lower: f64,
    /// Upper bound of the confidence interval.
    pub confidence_upper: f64,
    /// Risk tags explaining uncertainty.
    pub risk_factors: Vec<String>,
    /// Identifier of the model that produced the forecast.
    pub prediction_model: String,
    /// Accuracy once validated against a matching outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prediction_accuracy: Option<f64>,
    /// When the forecast was made.
    pub created_at: DateTime<Utc>,
    /// When the forecast was validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<DateTime<Utc>>,
}

/// Risk tag: too little history for a confident forecast.
pub const RISK_LIMITED_DATA: &str = "limited_historical_data";
/// Risk tag: the task is CRITICAL complexity.
pub const RISK_HIGH_COMPLEXITY: &str = "high_complexity_task";
/// Risk tag: success scores vary widely.
pub const RISK_HIGH_VARIABILITY: &str = "high_performance_variability";
/// Risk tag: errors observed in the recent window.
pub const RISK_RECENT_ERRORS: &str = "recent_errors_detected";
/// Risk tag: retries observed in the history.
pub const RISK_RETRY_PATTERN: &str = "retry_pattern_observed";
/// Risk tag: recent performance trails older performance.
pub const RISK_DECLINING_TREND: &str = "declining_performance_trend";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_score_boolean_only() {
        let metrics = BTreeMap::new();
        assert!((TaskOutcome::derive_success_score(true, &metrics) - 1.0).abs() < f64::EPSILON);
        assert!(TaskOutcome::derive_success_score(false, &metrics).abs() < f64::EPSILON);
    }

    #[test]
    fn test_success_score_averages_quality() {
        let mut metrics = BTreeMap::new();
        metrics.insert("coherence".to_string(), 0.9);
        metrics.insert("completeness".to_string(), 0.7);
        // (1.0 + 0.8) / 2 = 0.9
        assert!((TaskOutcome::derive_success_score(true, &metrics) - 0.9).abs() < 1e-9);
        // (0.0 + 0.8) / 2 = 0.4
        assert!((TaskOutcome::derive_success_score(false, &metrics) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_specialization_matching() {
        let spec = AgentSpecialization {
            agent_id: AgentId::new(),
            specialization_type: "bugfix_complex".to_string(),
            task_types: vec!["bugfix".to_string()],
            complexity_preferences: vec![TaskComplexity::Complex],
            confidence: 0.44,
            performance_advantage: 0.22,
            sample_size: 6,
            discovered_at: Utc::now(),
            last_validated: Utc::now(),
            is_active: true,
        };

        assert!(spec.matches("bugfix", TaskComplexity::Complex));
        assert!(!spec.matches("bugfix", TaskComplexity::Simple));
        assert!(!spec.matches("summarize", TaskComplexity::Complex));

        let inactive = AgentSpecialization {
            is_active: false,
            ..spec
        };
        assert!(!inactive.matches("bugfix", TaskComplexity::Complex));
    }

    #[test]
    fn test_routing_record_serialization_stable() {
        let record = RoutingRecord {
            routing_id: RoutingId::new(),
            agent_id: AgentId::new(),
            task_type: "summarize".to_string(),
            complexity: TaskComplexity::Moderate,
            selection_score: 0.85,
            routing_time_ms: 2.4,
            execution_success: Some(true),
            execution_time_ms: Some(812.0),
            cost_actual_cents: Some(4),
            task_metadata: serde_json::json!({"project": "default"}),
            created_at: Utc::now(),
        };

        let bytes = serde_json::to_vec(&record).unwrap();
        let parsed: RoutingRecord = serde_json::from_slice(&bytes).unwrap();
        let rebytes = serde_json::to_vec(&parsed).unwrap();
        assert_eq!(bytes, rebytes);
        assert!(parsed.is_resolved());
    }
}

//! Multi-dimensional performance scoring.

use serde::{Deserialize, Serialize};

/// Weight of the reliability sub-score in the overall score.
pub const WEIGHT_RELIABILITY: f64 = 0.25;
/// Weight of the latency-based performance sub-score.
pub const WEIGHT_PERFORMANCE: f64 = 0.20;
/// Weight of the cost-efficiency sub-score.
pub const WEIGHT_COST: f64 = 0.15;
/// Weight of the capability-match sub-score.
pub const WEIGHT_CAPABILITY: f64 = 0.20;
/// Weight of the load sub-score.
pub const WEIGHT_LOAD: f64 = 0.10;
/// Weight of the task-specific historical sub-score.
pub const WEIGHT_HISTORICAL: f64 = 0.10;

/// Multi-dimensional performance score for an agent, all components in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceScore {
    /// Weighted combination of the sub-scores, after load and task adjustments.
    pub overall: f64,
    /// Success-rate based reliability.
    pub reliability: f64,
    /// Latency-based performance.
    pub performance: f64,
    /// Cost efficiency relative to a 20-cent reference.
    pub cost_efficiency: f64,
    /// How well the agent's declared capabilities match the task.
    pub capability_match: f64,
    /// Load headroom (1.0 = idle).
    pub load: f64,
    /// Success rate on the same `(task_type, complexity)` pairing.
    pub historical: f64,
}

impl PerformanceScore {
    /// Compose a score from sub-scores, computing the weighted overall.
    ///
    /// The load sub-score starts at 1.0; the load penalty is applied
    /// afterwards by the scorer.
    #[must_use]
    pub fn from_components(
        reliability: f64,
        performance: f64,
        cost_efficiency: f64,
        capability_match: f64,
        historical: f64,
    ) -> Self {
        let load = 1.0;
        let overall = reliability * WEIGHT_RELIABILITY
            + performance * WEIGHT_PERFORMANCE
            + cost_efficiency * WEIGHT_COST
            + capability_match * WEIGHT_CAPABILITY
            + load * WEIGHT_LOAD
            + historical * WEIGHT_HISTORICAL;

        Self {
            overall,
            reliability,
            performance,
            cost_efficiency,
            capability_match,
            load,
            historical,
        }
        .clamped()
    }

    /// Clamp every component into [0, 1].
    #[must_use]
    pub fn clamped(mut self) -> Self {
        self.overall = self.overall.clamp(0.0, 1.0);
        self.reliability = self.reliability.clamp(0.0, 1.0);
        self.performance = self.performance.clamp(0.0, 1.0);
        self.cost_efficiency = self.cost_efficiency.clamp(0.0, 1.0);
        self.capability_match = self.capability_match.clamp(0.0, 1.0);
        self.load = self.load.clamp(0.0, 1.0);
        self.historical = self.historical.clamp(0.0, 1.0);
        self
    }

    /// True when every component is within [0, 1].
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        [
            self.overall,
            self.reliability,
            self.performance,
            self.cost_efficiency,
            self.capability_match,
            self.load,
            self.historical,
        ]
        .iter()
        .all(|v| (0.0..=1.0).contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_overall_with_defaults() {
        // Default sub-scores for an agent with no history.
        let score = PerformanceScore::from_components(0.8, 0.82, 1.0, 0.8, 0.8);
        // 0.8*0.25 + 0.82*0.20 + 1.0*0.15 + 0.8*0.20 + 1.0*0.10 + 0.8*0.10
        let expected = 0.2 + 0.164 + 0.15 + 0.16 + 0.1 + 0.08;
        assert!((score.overall - expected).abs() < 1e-9);
        assert!(score.is_normalized());
    }

    #[test]
    fn test_clamping() {
        let score = PerformanceScore {
            overall: 1.4,
            reliability: -0.1,
            performance: 0.5,
            cost_efficiency: 2.0,
            capability_match: 0.8,
            load: 1.0,
            historical: 0.8,
        }
        .clamped();
        assert!((score.overall - 1.0).abs() < f64::EPSILON);
        assert!(score.reliability.abs() < f64::EPSILON);
        assert!((score.cost_efficiency - 1.0).abs() < f64::EPSILON);
        assert!(score.is_normalized());
    }

    #[test]
    fn test_weights_sum_to_one() {
        let sum = WEIGHT_RELIABILITY
            + WEIGHT_PERFORMANCE
            + WEIGHT_COST
            + WEIGHT_CAPABILITY
            + WEIGHT_LOAD
            + WEIGHT_HISTORICAL;
        assert!((sum - 1.0).abs() < 1e-9);
    }
}

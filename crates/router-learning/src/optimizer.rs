//! Ensemble weight optimization.
//!
//! Three estimators run over the same 30-day aggregates and their
//! arithmetic mean becomes the candidate matrix:
//! - Bayesian posterior mean with an uncertainty discount
//! - Performance advantage over the per-task baseline, scaled by time
//!   and satisfaction factors
//! - Risk-adjusted success penalised by variability and thin samples

use router_core::WeightMatrix;
use router_storage::PerformanceGroup;
use std::collections::HashMap;

/// Bayesian posterior mean per group: Beta(1 + successes, 1 + failures)
/// discounted by `1 - 1/(alpha + beta)`.
#[must_use]
pub fn bayesian_weights(groups: &[PerformanceGroup]) -> WeightMatrix {
    let mut weights: WeightMatrix = HashMap::new();
    for group in groups {
        let successes = group.avg_success * group.sample_size as f64;
        let failures = (1.0 - group.avg_success) * group.sample_size as f64;
        let alpha = 1.0 + successes;
        let beta = 1.0 + failures;

        let posterior_mean = alpha / (alpha + beta);
        let uncertainty = 1.0 / (alpha + beta);
        let weight = (posterior_mean * (1.0 - uncertainty)).clamp(0.0, 1.0);

        weights
            .entry(group.agent_id)
            .or_default()
            .insert(group.task_key(), weight);
    }
    weights
}

/// Advantage over the per-task baseline, scaled by a time factor
/// (faster completions are preferred) and the satisfaction factor.
#[must_use]
pub fn performance_weights(groups: &[PerformanceGroup]) -> WeightMatrix {
    let baselines = task_baselines(groups);

    let mut weights: WeightMatrix = HashMap::new();
    for group in groups {
        let baseline = baselines.get(&group.task_key()).copied().unwrap_or(0.5);
        let advantage = group.avg_success - baseline;

        let time_factor = (1.0 - (group.avg_time_seconds - 5.0) / 30.0).max(0.1);
        let satisfaction_factor = group.avg_satisfaction / 5.0;

        let weight = ((0.5 + advantage * 2.0).max(0.0) * time_factor * satisfaction_factor)
            .clamp(0.0, 1.0);

        weights
            .entry(group.agent_id)
            .or_default()
            .insert(group.task_key(), weight);
    }
    weights
}

/// Success penalised by half the standard deviation, scaled by a
/// sample-size confidence multiplier saturating at 50 samples.
#[must_use]
pub fn risk_adjusted_weights(groups: &[PerformanceGroup]) -> WeightMatrix {
    let mut weights: WeightMatrix = HashMap::new();
    for group in groups {
        let std = if group.std_success > 0.0 {
            group.std_success
        } else {
            0.1
        };
        let risk_adjusted = group.avg_success - std / 2.0;
        let confidence = (group.sample_size as f64 / 50.0).min(1.0);
        let weight = (risk_adjusted * confidence).clamp(0.0, 1.0);

        weights
            .entry(group.agent_id)
            .or_default()
            .insert(group.task_key(), weight);
    }
    weights
}

/// Arithmetic mean of the three estimators.
#[must_use]
pub fn ensemble_weights(groups: &[PerformanceGroup]) -> WeightMatrix {
    let estimators = [
        bayesian_weights(groups),
        performance_weights(groups),
        risk_adjusted_weights(groups),
    ];

    let mut combined: WeightMatrix = HashMap::new();
    for estimator in &estimators {
        for (agent_id, tasks) in estimator {
            let row = combined.entry(*agent_id).or_default();
            for (task_key, weight) in tasks {
                *row.entry(task_key.clone()).or_insert(0.0) += weight / estimators.len() as f64;
            }
        }
    }
    combined
}

/// Sample-weighted mean success of the current aggregates.
#[must_use]
pub fn current_performance(groups: &[PerformanceGroup]) -> f64 {
    let mut total = 0.0;
    let mut weight = 0.0;
    for group in groups {
        total += group.avg_success * group.sample_size as f64;
        weight += group.sample_size as f64;
    }
    if weight > 0.0 {
        total / weight
    } else {
        0.5
    }
}

/// Expected sample-weighted success under the candidate matrix,
/// assuming better weighting buys at most a 10% lift per group.
#[must_use]
pub fn expected_performance(weights: &WeightMatrix, groups: &[PerformanceGroup]) -> f64 {
    let mut total = 0.0;
    let mut weight_sum = 0.0;
    for group in groups {
        let Some(weight) = weights
            .get(&group.agent_id)
            .and_then(|row| row.get(&group.task_key()))
        else {
            continue;
        };
        let expected = (group.avg_success + weight * 0.1).min(1.0);
        total += expected * group.sample_size as f64;
        weight_sum += group.sample_size as f64;
    }
    if weight_sum > 0.0 {
        total / weight_sum
    } else {
        0.5
    }
}

fn task_baselines(groups: &[PerformanceGroup]) -> HashMap<String, f64> {
    let mut sums: HashMap<String, (f64, usize)> = HashMap::new();
    for group in groups {
        let entry = sums.entry(group.task_key()).or_insert((0.0, 0));
        entry.0 += group.avg_success;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(key, (sum, count))| (key, sum / count as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{AgentId, TaskComplexity};

    fn group(
        agent_id: AgentId,
        task_type: &str,
        sample_size: u64,
        avg_success: f64,
        std_success: f64,
        avg_time_seconds: f64,
    ) -> PerformanceGroup {
        PerformanceGroup {
            agent_id,
            task_type: task_type.to_string(),
            complexity: TaskComplexity::Moderate,
            sample_size,
            avg_success,
            std_success,
            avg_time_seconds,
            avg_satisfaction: 4.0,
        }
    }

    #[test]
    fn test_bayesian_posterior_discounts_thin_samples() {
        let agent = AgentId::new();
        let thin = [group(agent, "summarize", 5, 0.9, 0.1, 5.0)];
        let thick = [group(agent, "summarize", 200, 0.9, 0.1, 5.0)];

        let thin_weight = bayesian_weights(&thin)[&agent]["summarize_moderate"];
        let thick_weight = bayesian_weights(&thick)[&agent]["summarize_moderate"];
        assert!(thick_weight > thin_weight);
        assert!((0.0..=1.0).contains(&thin_weight));
    }

    #[test]
    fn test_performance_weights_reward_advantage() {
        let strong = AgentId::new();
        let weak = AgentId::new();
        let groups = [
            group(strong, "bugfix", 30, 0.9, 0.1, 5.0),
            group(weak, "bugfix", 30, 0.5, 0.1, 5.0),
        ];

        let weights = performance_weights(&groups);
        assert!(weights[&strong]["bugfix_moderate"] > weights[&weak]["bugfix_moderate"]);
    }

    #[test]
    fn test_performance_weights_penalize_slow_agents() {
        let fast = AgentId::new();
        let slow = AgentId::new();
        let groups = [
            group(fast, "bugfix", 30, 0.8, 0.1, 5.0),
            group(slow, "bugfix", 30, 0.8, 0.1, 40.0),
        ];

        let weights = performance_weights(&groups);
        assert!(weights[&fast]["bugfix_moderate"] > weights[&slow]["bugfix_moderate"]);
        // The time factor floors at 0.1 rather than going negative.
        assert!(weights[&slow]["bugfix_moderate"] > 0.0);
    }

    #[test]
    fn test_risk_adjustment_penalizes_variability() {
        let steady = AgentId::new();
        let erratic = AgentId::new();
        let groups = [
            group(steady, "summarize", 50, 0.8, 0.05, 5.0),
            group(erratic, "summarize", 50, 0.8, 0.4, 5.0),
        ];

        let weights = risk_adjusted_weights(&groups);
        assert!(weights[&steady]["summarize_moderate"] > weights[&erratic]["summarize_moderate"]);
    }

    #[test]
    fn test_ensemble_is_mean_of_estimators() {
        let agent = AgentId::new();
        let groups = [group(agent, "summarize", 30, 0.85, 0.1, 8.0)];

        let bayes = bayesian_weights(&groups)[&agent]["summarize_moderate"];
        let perf = performance_weights(&groups)[&agent]["summarize_moderate"];
        let risk = risk_adjusted_weights(&groups)[&agent]["summarize_moderate"];
        let ensemble = ensemble_weights(&groups)[&agent]["summarize_moderate"];

        assert!((ensemble - (bayes + perf + risk) / 3.0).abs() < 1e-9);
        assert!((0.0..=1.0).contains(&ensemble));
    }

    #[test]
    fn test_ensemble_deterministic() {
        let agent = AgentId::new();
        let groups = [
            group(agent, "summarize", 30, 0.85, 0.1, 8.0),
            group(agent, "bugfix", 25, 0.7, 0.2, 12.0),
        ];
        assert_eq!(ensemble_weights(&groups), ensemble_weights(&groups));
    }

    #[test]
    fn test_expected_improvement_positive_for_good_weights() {
        let agent = AgentId::new();
        let groups = [group(agent, "summarize", 40, 0.8, 0.1, 6.0)];
        let weights = ensemble_weights(&groups);

        let current = current_performance(&groups);
        let expected = expected_performance(&weights, &groups);
        assert!(expected >= current);
    }
}

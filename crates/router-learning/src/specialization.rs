//! Agent specialization detection.
//!
//! A specialization is a `(task_type, complexity)` pairing on which an
//! agent outperforms its own overall mean by a material margin with
//! enough samples.

use chrono::{DateTime, Utc};
use router_core::{AgentId, AgentSpecialization, TaskComplexity, TaskOutcome};
use std::collections::HashMap;

/// Minimum samples per pairing before a specialization is considered.
const MIN_GROUP_SAMPLES: usize = 5;
/// Minimum mean success for the pairing itself.
const MIN_GROUP_MEAN: f64 = 0.8;
/// Minimum advantage over the agent's overall mean.
const MIN_ADVANTAGE: f64 = 0.15;

/// Detect specializations for one agent from its outcome history.
///
/// Returns one entry per qualifying `(task_type, complexity)` group:
/// n >= 5, group mean >= 0.8, and advantage over the agent's overall
/// mean > 0.15. Confidence is `min(1, 2 * advantage)`.
#[must_use]
pub fn detect_specializations(
    agent_id: AgentId,
    outcomes: &[TaskOutcome],
    now: DateTime<Utc>,
) -> Vec<AgentSpecialization> {
    if outcomes.is_empty() {
        return Vec::new();
    }

    let overall_mean =
        outcomes.iter().map(|o| o.success_score).sum::<f64>() / outcomes.len() as f64;

    let mut groups: HashMap<(String, TaskComplexity), Vec<f64>> = HashMap::new();
    for outcome in outcomes {
        groups
            .entry((outcome.task_type.clone(), outcome.complexity))
            .or_default()
            .push(outcome.success_score);
    }

    let mut detected: Vec<AgentSpecialization> = groups
        .into_iter()
        .filter_map(|((task_type, complexity), scores)| {
            if scores.len() < MIN_GROUP_SAMPLES {
                return None;
            }
            let group_mean = scores.iter().sum::<f64>() / scores.len() as f64;
            let advantage = group_mean - overall_mean;
            if group_mean < MIN_GROUP_MEAN || advantage <= MIN_ADVANTAGE {
                return None;
            }

            Some(AgentSpecialization {
                agent_id,
                specialization_type: format!("{}_{}", task_type, complexity.as_str()),
                task_types: vec![task_type],
                complexity_preferences: vec![complexity],
                confidence: (advantage * 2.0).min(1.0),
                performance_advantage: advantage,
                sample_size: scores.len() as u64,
                discovered_at: now,
                last_validated: now,
                is_active: true,
            })
        })
        .collect();

    detected.sort_by(|a, b| {
        b.performance_advantage
            .partial_cmp(&a.performance_advantage)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    detected
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::RoutingId;
    use std::collections::BTreeMap;

    fn outcome(
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        score: f64,
    ) -> TaskOutcome {
        TaskOutcome {
            routing_id: RoutingId::new(),
            agent_id,
            task_type: task_type.to_string(),
            complexity,
            success_score: score,
            completion_seconds: 5.0,
            quality_metrics: BTreeMap::new(),
            user_satisfaction: None,
            error_count: 0,
            retry_attempts: 0,
            cost_actual_cents: None,
            context_metadata: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    /// 20 outcomes with overall mean 0.7, of which 6 bugfix/complex
    /// outcomes average 0.92: advantage 0.22 qualifies.
    #[test]
    fn test_detects_clear_specialization() {
        let agent = AgentId::new();
        let mut outcomes = Vec::new();
        for _ in 0..6 {
            outcomes.push(outcome(agent, "bugfix", TaskComplexity::Complex, 0.92));
        }
        // 14 remaining outcomes averaging (0.7*20 - 0.92*6)/14
        let filler_score = (0.7 * 20.0 - 0.92 * 6.0) / 14.0;
        for _ in 0..14 {
            outcomes.push(outcome(agent, "summarize", TaskComplexity::Simple, filler_score));
        }

        let specs = detect_specializations(agent, &outcomes, Utc::now());
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.specialization_type, "bugfix_complex");
        assert!((spec.performance_advantage - 0.22).abs() < 1e-9);
        assert!((spec.confidence - 0.44).abs() < 1e-9);
        assert_eq!(spec.sample_size, 6);
        assert!(spec.is_active);
    }

    #[test]
    fn test_small_group_is_ignored() {
        let agent = AgentId::new();
        let mut outcomes = Vec::new();
        for _ in 0..4 {
            outcomes.push(outcome(agent, "bugfix", TaskComplexity::Complex, 0.95));
        }
        for _ in 0..16 {
            outcomes.push(outcome(agent, "summarize", TaskComplexity::Simple, 0.6));
        }

        assert!(detect_specializations(agent, &outcomes, Utc::now()).is_empty());
    }

    #[test]
    fn test_high_mean_without_advantage_is_ignored() {
        let agent = AgentId::new();
        // Everything is 0.9: no pairing stands out from the agent's mean.
        let outcomes: Vec<TaskOutcome> = (0..20)
            .map(|i| {
                let task_type = if i % 2 == 0 { "bugfix" } else { "summarize" };
                outcome(agent, task_type, TaskComplexity::Moderate, 0.9)
            })
            .collect();

        assert!(detect_specializations(agent, &outcomes, Utc::now()).is_empty());
    }

    #[test]
    fn test_advantage_without_quality_is_ignored() {
        let agent = AgentId::new();
        let mut outcomes = Vec::new();
        // Pairing mean 0.75 is a big advantage over 0.5 overall, but
        // below the 0.8 quality floor.
        for _ in 0..6 {
            outcomes.push(outcome(agent, "bugfix", TaskComplexity::Complex, 0.75));
        }
        for _ in 0..14 {
            outcomes.push(outcome(agent, "summarize", TaskComplexity::Simple, 0.4));
        }

        assert!(detect_specializations(agent, &outcomes, Utc::now()).is_empty());
    }
}

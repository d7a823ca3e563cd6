//! Success probability prediction.
//!
//! Two models: a limited-data baseline for pairings with fewer than five
//! recorded outcomes, and a historical model with trend and context
//! adjustments once enough history exists.

use chrono::{DateTime, Duration, Utc};
use router_core::outcome::{
    RISK_DECLINING_TREND, RISK_HIGH_COMPLEXITY, RISK_HIGH_VARIABILITY, RISK_LIMITED_DATA,
    RISK_RECENT_ERRORS, RISK_RETRY_PATTERN,
};
use router_core::{
    AgentId, AgentSpecialization, SuccessPrediction, TaskComplexity, TaskContext, TaskOutcome,
};
use uuid::Uuid;

/// Pairing outcomes required for the historical model.
const MIN_PAIRING_OUTCOMES: usize = 5;
/// Identifier of the limited-data model.
pub const MODEL_LIMITED_DATA: &str = "limited_data_baseline";
/// Identifier of the historical model.
pub const MODEL_HISTORICAL: &str = "historical_performance_model";

/// Inputs the predictor draws from the engine's in-memory state.
pub struct PredictionInputs<'a> {
    /// Outcomes for this exact `(agent, task_type, complexity)` pairing.
    pub pairing_outcomes: &'a [TaskOutcome],
    /// Active specializations for the agent.
    pub specializations: &'a [AgentSpecialization],
    /// Learned weight for the pairing, when one exists.
    pub weight: Option<f64>,
}

/// Predict the success probability of routing `task` to `agent_id`.
#[must_use]
pub fn predict(
    task: &TaskContext,
    agent_id: AgentId,
    inputs: &PredictionInputs<'_>,
    now: DateTime<Utc>,
) -> SuccessPrediction {
    if inputs.pairing_outcomes.len() < MIN_PAIRING_OUTCOMES {
        predict_limited(task, agent_id, inputs, now)
    } else {
        predict_historical(task, agent_id, inputs.pairing_outcomes, now)
    }
}

fn predict_limited(
    task: &TaskContext,
    agent_id: AgentId,
    inputs: &PredictionInputs<'_>,
    now: DateTime<Utc>,
) -> SuccessPrediction {
    let mut base_rate: f64 = 0.7;

    for spec in inputs.specializations {
        if spec.agent_id == agent_id && spec.matches(&task.task_type, task.complexity) {
            base_rate += spec.performance_advantage * 0.3;
        }
    }

    if let Some(weight) = inputs.weight {
        base_rate = (base_rate + weight) / 2.0;
    }
    base_rate = base_rate.clamp(0.0, 1.0);

    let mut risk_factors = vec![RISK_LIMITED_DATA.to_string()];
    if task.complexity == TaskComplexity::Critical {
        risk_factors.push(RISK_HIGH_COMPLEXITY.to_string());
    }

    SuccessPrediction {
        id: Uuid::new_v4(),
        agent_id,
        task_type: task.task_type.clone(),
        complexity: task.complexity,
        predicted_rate: base_rate,
        confidence_lower: (base_rate - 0.3).max(0.0),
        confidence_upper: (base_rate + 0.3).min(1.0),
        risk_factors,
        prediction_model: MODEL_LIMITED_DATA.to_string(),
        prediction_accuracy: None,
        created_at: now,
        validated_at: None,
    }
}

fn predict_historical(
    task: &TaskContext,
    agent_id: AgentId,
    outcomes: &[TaskOutcome],
    now: DateTime<Utc>,
) -> SuccessPrediction {
    let scores: Vec<f64> = outcomes.iter().map(|o| o.success_score).collect();
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    let variance =
        scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
    let std = variance.sqrt();

    // Trend: recent week vs everything older, weighted at 20%.
    let week_ago = now - Duration::days(7);
    let recent: Vec<&TaskOutcome> = outcomes.iter().filter(|o| o.recorded_at >= week_ago).collect();
    let older: Vec<&TaskOutcome> = outcomes.iter().filter(|o| o.recorded_at < week_ago).collect();
    let trend_factor = if recent.is_empty() || older.is_empty() {
        0.0
    } else {
        let recent_mean =
            recent.iter().map(|o| o.success_score).sum::<f64>() / recent.len() as f64;
        let older_mean = older.iter().map(|o| o.success_score).sum::<f64>() / older.len() as f64;
        (recent_mean - older_mean) * 0.2
    };

    let mut context_adjustment = 0.0;
    if task.priority >= 8 {
        context_adjustment -= 0.05;
    } else if task.priority <= 3 {
        context_adjustment += 0.05;
    }
    if let Some(remaining) = task.seconds_until_deadline(now) {
        if remaining < 2.0 * 3600.0 {
            context_adjustment -= 0.1;
        }
    }

    let predicted = (mean + trend_factor + context_adjustment).clamp(0.0, 1.0);
    let half_width = 1.96 * std / (outcomes.len() as f64).sqrt();

    let mut risk_factors = Vec::new();
    if std > 0.3 {
        risk_factors.push(RISK_HIGH_VARIABILITY.to_string());
    }
    if recent.iter().any(|o| o.error_count > 0) {
        risk_factors.push(RISK_RECENT_ERRORS.to_string());
    }
    if outcomes.iter().any(|o| o.retry_attempts > 1) {
        risk_factors.push(RISK_RETRY_PATTERN.to_string());
    }
    if trend_factor < -0.1 {
        risk_factors.push(RISK_DECLINING_TREND.to_string());
    }

    SuccessPrediction {
        id: Uuid::new_v4(),
        agent_id,
        task_type: task.task_type.clone(),
        complexity: task.complexity,
        predicted_rate: predicted,
        confidence_lower: (predicted - half_width).max(0.0),
        confidence_upper: (predicted + half_width).min(1.0),
        risk_factors,
        prediction_model: MODEL_HISTORICAL.to_string(),
        prediction_accuracy: None,
        created_at: now,
        validated_at: None,
    }
}

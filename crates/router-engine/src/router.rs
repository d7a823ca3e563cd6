//! The intelligent router.
//!
//! Composes the base pipeline (candidates, breaker filter, scoring,
//! selection) with the learning overrides: specialization matches,
//! routing-weight swaps, and the prediction-threshold fallback. The
//! routing record is emitted and the load counter incremented only for
//! the final pick.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use router_core::{
    AgentId, AgentSelection, AgentStatus, EnhancedRoutingResult, LearningInsights, LoadLevel,
    RouterError, RouterResult, RoutingId, SuccessPrediction, TaskContext,
};
use router_learning::LearningEngine;
use router_registry::{Agent, Registry};
use router_resilience::{BreakerRegistry, LoadTracker};
use router_scoring::{ScoredCandidate, Scorer, Selector};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Weight below which the base pick is reconsidered.
const LOW_WEIGHT_FLOOR: f64 = 0.4;
/// Weight above which an alternative qualifies for a swap.
const HIGH_WEIGHT_BAR: f64 = 0.6;
/// Weight above which an agent is listed as an alternative.
const ALTERNATIVE_WEIGHT_BAR: f64 = 0.7;
/// Maximum agents probed by the prediction fallback.
const PREDICTION_PROBE_LIMIT: usize = 10;
/// Maximum alternatives reported to the caller.
const MAX_ALTERNATIVES: usize = 5;

/// Shared components the router composes.
#[derive(Clone)]
pub struct RouterComponents {
    /// Agent registry.
    pub registry: Arc<Registry>,
    /// Circuit breaker registry.
    pub breakers: Arc<BreakerRegistry>,
    /// In-flight load tracker.
    pub load: Arc<LoadTracker>,
    /// Performance scorer.
    pub scorer: Arc<Scorer>,
    /// Candidate selector.
    pub selector: Arc<Selector>,
    /// Learning engine.
    pub learning: Arc<LearningEngine>,
}

/// Result of routing one subtask in a fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskResult {
    /// Index of the subtask in the submitted batch.
    pub index: usize,
    /// The routing result, when successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub routing_id: Option<RoutingId>,
    /// Selected agent, when successful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<AgentId>,
    /// Error kind, when routing failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a subtask fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskRouting {
    /// Subtasks submitted.
    pub total: usize,
    /// Subtasks routed successfully.
    pub routed: usize,
    /// Subtasks that failed to route.
    pub failed: usize,
    /// Per-subtask results, in submission order.
    pub results: Vec<SubtaskResult>,
}

/// Context-aware router with learning-driven overrides.
pub struct IntelligentRouter {
    components: RouterComponents,
    learning_enabled: bool,
    prediction_threshold: f64,
}

impl IntelligentRouter {
    /// Create a router over shared components.
    #[must_use]
    pub fn new(
        components: RouterComponents,
        learning_enabled: bool,
        prediction_threshold: f64,
    ) -> Self {
        Self {
            components,
            learning_enabled,
            prediction_threshold,
        }
    }

    /// Route a task to the best available agent.
    ///
    /// # Errors
    /// `NoCapableAgent` when no active agent satisfies the requirements,
    /// `AllBreakersOpen` when every capable agent is circuit-broken.
    #[instrument(skip(self, task), fields(task_type = %task.task_type, complexity = %task.complexity))]
    pub async fn route(&self, task: &TaskContext) -> RouterResult<EnhancedRoutingResult> {
        let started = Instant::now();
        let now = Utc::now();
        let c = &self.components;

        // Candidate set, then breaker gating.
        let candidates = c.registry.candidates(task)?;
        let candidate_ids: Vec<AgentId> = candidates.iter().map(|a| a.id).collect();
        let eligible_ids = c.breakers.filter(&candidate_ids, now);
        if eligible_ids.is_empty() {
            let rejected = candidates.into_iter().map(|a| a.name).collect();
            return Err(RouterError::all_breakers_open(rejected));
        }

        // Score the survivors.
        let mut scored = Vec::with_capacity(eligible_ids.len());
        for agent in candidates
            .into_iter()
            .filter(|a| eligible_ids.contains(&a.id))
        {
            let score = c.scorer.score(agent.id, task, now).await;
            scored.push(ScoredCandidate { agent, score });
        }

        // Base pick, then the learning override ladder.
        let mut selection = c.selector.pick(task, scored, now).await?;
        let base_reason = selection.reason.clone();
        let mut insights = LearningInsights::default();
        let mut optimization_confidence = 0.0;
        let mut prediction = None;

        if self.learning_enabled {
            optimization_confidence = self
                .apply_learning_overrides(task, &mut selection, &mut insights, now)
                .await;
            prediction = Some(
                self.apply_prediction_fallback(task, &mut selection, &mut insights, now)
                    .await,
            );
        }

        let alternative_agents = self.collect_alternatives(task, selection.agent_id);
        let explanation = build_explanation(
            &base_reason,
            &selection,
            prediction.as_ref(),
            &insights,
        );

        let routing_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        let routing_id = c.selector.commit(task, &selection, routing_time_ms, now).await;

        info!(
            routing_id = %routing_id,
            agent = %selection.agent_name,
            optimization = ?insights.optimization_type,
            alternative = insights.alternative_selected,
            routing_time_ms,
            "Routing completed"
        );

        Ok(EnhancedRoutingResult {
            routing_id,
            selection,
            prediction,
            learning_insights: insights,
            optimization_confidence,
            alternative_agents,
            explanation,
            routing_time_ms,
        })
    }

    /// Route with a caller-imposed timeout.
    ///
    /// # Errors
    /// `RoutingTimeout` when the deadline elapses before a decision.
    pub async fn route_with_timeout(
        &self,
        task: &TaskContext,
        timeout: Duration,
    ) -> RouterResult<EnhancedRoutingResult> {
        match tokio::time::timeout(timeout, self.route(task)).await {
            Ok(result) => result,
            Err(_) => Err(RouterError::RoutingTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Route a batch of independent subtasks concurrently.
    pub async fn route_subtasks(&self, subtasks: Vec<TaskContext>) -> SubtaskRouting {
        let total = subtasks.len();
        let futures = subtasks
            .iter()
            .enumerate()
            .map(|(index, task)| async move {
                match self.route(task).await {
                    Ok(result) => SubtaskResult {
                        index,
                        routing_id: Some(result.routing_id),
                        agent_id: Some(result.selection.agent_id),
                        error: None,
                    },
                    Err(e) => SubtaskResult {
                        index,
                        routing_id: None,
                        agent_id: None,
                        error: Some(e.kind().to_string()),
                    },
                }
            });

        let results = join_all(futures).await;
        let routed = results.iter().filter(|r| r.error.is_none()).count();
        SubtaskRouting {
            total,
            routed,
            failed: total - routed,
            results,
        }
    }

    /// Steps 2-3 of the override ladder: specialization match, then
    /// routing-weight swap. Returns the optimization confidence.
    async fn apply_learning_overrides(
        &self,
        task: &TaskContext,
        selection: &mut AgentSelection,
        insights: &mut LearningInsights,
        now: DateTime<Utc>,
    ) -> f64 {
        let c = &self.components;

        // Specialization match: another healthy agent with a positive
        // advantage over the base pick takes over.
        let mut best: Option<(Agent, f64)> = None;
        for spec in c
            .learning
            .specializations_for(&task.task_type, task.complexity)
        {
            if spec.agent_id == selection.agent_id || spec.performance_advantage <= 0.0 {
                continue;
            }
            if best
                .as_ref()
                .is_some_and(|(_, advantage)| *advantage >= spec.performance_advantage)
            {
                continue;
            }
            if let Some(agent) = self.healthy_agent(spec.agent_id, now) {
                best = Some((agent, spec.performance_advantage));
            }
        }

        if let Some((agent, advantage)) = best {
            debug!(
                from = %selection.agent_name,
                to = %agent.name,
                advantage,
                "Specialization override applied"
            );
            selection.confidence = (selection.confidence + advantage).min(1.0);
            selection.reason = format!(
                "ML optimization: {:.1}% performance advantage for {}",
                advantage * 100.0,
                task.task_type
            );
            selection.estimated_completion_seconds *= 1.0 - advantage * 0.3;
            selection.agent_id = agent.id;
            selection.agent_name = agent.name;
            selection.metadata.load_level = c.load.load_level(selection.agent_id);
            selection.metadata.optimization_type = Some("specialization_match".to_string());
            insights.optimization_type = Some("specialization_match".to_string());
            insights.performance_advantage = Some(advantage);
            return (advantage * 2.0).min(1.0);
        }

        // Routing-weight swap: a low-weight base pick yields to a
        // clearly higher-weight alternative.
        let task_key = task.task_key();
        let base_weight = c
            .learning
            .weight(selection.agent_id, &task_key)
            .unwrap_or(0.5);
        if base_weight < LOW_WEIGHT_FLOOR {
            let weights = c.learning.weights_snapshot();
            let mut alternatives: Vec<(AgentId, f64)> = weights
                .iter()
                .filter_map(|(agent_id, row)| {
                    let weight = row.get(&task_key).copied()?;
                    (*agent_id != selection.agent_id && weight > HIGH_WEIGHT_BAR)
                        .then_some((*agent_id, weight))
                })
                .collect();
            alternatives.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

            for (agent_id, weight) in alternatives {
                let Some(agent) = self.healthy_agent(agent_id, now) else {
                    continue;
                };
                let improvement = weight - base_weight;
                debug!(
                    from = %selection.agent_name,
                    to = %agent.name,
                    improvement,
                    "Routing-weight override applied"
                );
                selection.confidence = weight;
                selection.reason = format!(
                    "ML optimization: higher success probability ({:.1}%)",
                    weight * 100.0
                );
                selection.agent_id = agent.id;
                selection.agent_name = agent.name;
                selection.metadata.load_level = c.load.load_level(selection.agent_id);
                selection.metadata.optimization_type = Some("routing_weight".to_string());
                insights.optimization_type = Some("routing_weight".to_string());
                insights.weight_improvement = Some(improvement);
                return (improvement * 2.0).min(1.0);
            }
        }

        0.0
    }

    /// Step 4: when the chosen agent's predicted success falls below the
    /// threshold, probe other active agents for a better forecast.
    async fn apply_prediction_fallback(
        &self,
        task: &TaskContext,
        selection: &mut AgentSelection,
        insights: &mut LearningInsights,
        now: DateTime<Utc>,
    ) -> SuccessPrediction {
        let c = &self.components;
        let prediction = c.learning.predict(task, selection.agent_id, now).await;
        if prediction.predicted_rate >= self.prediction_threshold {
            return prediction;
        }

        warn!(
            agent = %selection.agent_name,
            predicted = prediction.predicted_rate,
            threshold = self.prediction_threshold,
            "Low success prediction, probing alternatives"
        );

        let mut best: Option<(Agent, SuccessPrediction)> = None;
        let probes: Vec<Agent> = c
            .registry
            .active()
            .into_iter()
            .filter(|a| a.id != selection.agent_id)
            .take(PREDICTION_PROBE_LIMIT)
            .collect();
        for agent in probes {
            let candidate = c.learning.predict(task, agent.id, now).await;
            if candidate.predicted_rate <= self.prediction_threshold {
                continue;
            }
            if best
                .as_ref()
                .is_some_and(|(_, p)| p.predicted_rate >= candidate.predicted_rate)
            {
                continue;
            }
            best = Some((agent, candidate));
        }

        match best {
            Some((agent, better)) => {
                selection.confidence = better.predicted_rate;
                selection.reason = format!(
                    "Alternative selected: {:.1}% success rate",
                    better.predicted_rate * 100.0
                );
                selection.agent_id = agent.id;
                selection.agent_name = agent.name;
                selection.metadata.load_level = c.load.load_level(selection.agent_id);
                insights.alternative_selected = true;
                better
            }
            None => prediction,
        }
    }

    /// Other viable agents for the caller: specialized agents for the
    /// task type plus high-weight agents for the task key.
    fn collect_alternatives(&self, task: &TaskContext, chosen: AgentId) -> Vec<AgentId> {
        let c = &self.components;
        let mut alternatives: Vec<AgentId> = Vec::new();

        for spec in c.learning.active_specializations() {
            if spec.agent_id != chosen
                && spec.task_types.iter().any(|t| t == &task.task_type)
                && !alternatives.contains(&spec.agent_id)
            {
                alternatives.push(spec.agent_id);
            }
        }

        let task_key = task.task_key();
        let weights = c.learning.weights_snapshot();
        for (agent_id, row) in weights.iter() {
            if *agent_id == chosen || alternatives.contains(agent_id) {
                continue;
            }
            if row.get(&task_key).copied().unwrap_or(0.0) > ALTERNATIVE_WEIGHT_BAR {
                alternatives.push(*agent_id);
            }
        }

        alternatives.truncate(MAX_ALTERNATIVES);
        alternatives
    }

    /// An agent qualifies as a swap target when it is ACTIVE, not
    /// overloaded, and its breaker admits traffic.
    fn healthy_agent(&self, agent_id: AgentId, now: DateTime<Utc>) -> Option<Agent> {
        let c = &self.components;
        let agent = c.registry.get(agent_id)?;
        if agent.status != AgentStatus::Active {
            return None;
        }
        if c.load.load_level(agent_id) == LoadLevel::Overloaded {
            return None;
        }
        let admitted = c
            .breakers
            .get(agent_id)
            .map_or(true, |breaker| breaker.allow_request(now));
        admitted.then_some(agent)
    }
}

/// Assemble the combined explanation string.
fn build_explanation(
    base_reason: &str,
    selection: &AgentSelection,
    prediction: Option<&SuccessPrediction>,
    insights: &LearningInsights,
) -> String {
    let mut parts = vec![format!(
        "Selected {} (confidence: {:.1}%)",
        selection.agent_name,
        selection.confidence * 100.0
    )];

    match insights.optimization_type.as_deref() {
        Some("specialization_match") => {
            let advantage = insights.performance_advantage.unwrap_or(0.0);
            parts.push(format!(
                "via specialization detection (+{:.1}% advantage)",
                advantage * 100.0
            ));
        }
        Some("routing_weight") => {
            let improvement = insights.weight_improvement.unwrap_or(0.0);
            parts.push(format!(
                "via routing weight optimization (+{:.1}% success rate)",
                improvement * 100.0
            ));
        }
        _ => parts.push(base_reason.trim_end_matches('.').to_string()),
    }

    if let Some(prediction) = prediction {
        parts.push(format!(
            "with {:.1}% predicted success",
            prediction.predicted_rate * 100.0
        ));
        if !prediction.risk_factors.is_empty() {
            let risks: Vec<&str> = prediction
                .risk_factors
                .iter()
                .take(2)
                .map(String::as_str)
                .collect();
            parts.push(format!("(risks: {})", risks.join(", ")));
        }
    }

    if insights.alternative_selected {
        parts.push("(alternative due to low success prediction)".to_string());
    }

    format!("{}.", parts.join(". "))
}

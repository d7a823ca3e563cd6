//! Final candidate selection.
//!
//! Ranks scored candidates, chooses the winner, enumerates fallbacks,
//! estimates completion time and cost from pairing history, assembles the
//! selection rationale, and emits the routing record so the eventual
//! outcome report can join on its id. The load counter is incremented
//! only after the selection is fully constructed; error paths never touch
//! it.

use chrono::{DateTime, Duration, Utc};
use router_core::{
    AgentSelection, PerformanceScore, RouterError, RouterResult, RoutingId, RoutingRecord,
    SelectionMetadata, TaskContext,
};
use router_registry::Agent;
use router_resilience::LoadTracker;
use router_storage::MetricsStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Window for completion-time and cost estimates.
const ESTIMATE_WINDOW_DAYS: i64 = 14;
/// Completion estimates grow by this factor per in-flight request.
const LOAD_TIME_FACTOR: f64 = 0.1;
/// Maximum number of fallback agents.
const MAX_FALLBACKS: usize = 3;

/// A candidate with its final score.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// The candidate agent.
    pub agent: Agent,
    /// Final (load- and task-adjusted) score.
    pub score: PerformanceScore,
}

/// Ranks scored candidates and emits selections.
pub struct Selector {
    store: Arc<dyn MetricsStore>,
    load: Arc<LoadTracker>,
}

impl Selector {
    /// Create a selector over the given store and load tracker.
    #[must_use]
    pub fn new(store: Arc<dyn MetricsStore>, load: Arc<LoadTracker>) -> Self {
        Self { store, load }
    }

    /// Rank scored candidates and build the base selection without any
    /// side effects. The caller commits the (possibly overridden)
    /// selection with [`Selector::commit`].
    ///
    /// # Errors
    /// Returns `NoCapableAgent` when `candidates` is empty.
    pub async fn pick(
        &self,
        task: &TaskContext,
        mut candidates: Vec<ScoredCandidate>,
        now: DateTime<Utc>,
    ) -> RouterResult<AgentSelection> {
        if candidates.is_empty() {
            return Err(RouterError::no_capable_agent("no scored candidates"));
        }

        candidates.sort_by(|a, b| {
            b.score
                .overall
                .partial_cmp(&a.score.overall)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let best = candidates[0].clone();
        let fallback_agents = candidates
            .iter()
            .skip(1)
            .take(MAX_FALLBACKS)
            .map(|c| c.agent.id)
            .collect();

        let estimated_completion_seconds = self.estimate_completion(&best.agent, task, now).await;
        let estimated_cost_cents = self.estimate_cost(&best.agent, task, now).await;
        let reason = build_reason(&best.score, task);

        Ok(AgentSelection {
            agent_id: best.agent.id,
            agent_name: best.agent.name.clone(),
            confidence: best.score.overall,
            reason,
            fallback_agents,
            estimated_completion_seconds,
            estimated_cost_cents,
            metadata: SelectionMetadata {
                score_breakdown: best.score,
                load_level: self.load.load_level(best.agent.id),
                selected_at: now,
                candidates_considered: candidates.len(),
                optimization_type: None,
            },
        })
    }

    /// Commit a selection: emit the routing record so the eventual
    /// outcome report can join on its id, then increment the winner's
    /// load counter. The record is persisted before returning; a
    /// persistence failure is logged and does not abort the selection.
    pub async fn commit(
        &self,
        task: &TaskContext,
        selection: &AgentSelection,
        routing_time_ms: f64,
        now: DateTime<Utc>,
    ) -> RoutingId {
        let routing_id = RoutingId::new();
        let record = RoutingRecord {
            routing_id,
            agent_id: selection.agent_id,
            task_type: task.task_type.clone(),
            complexity: task.complexity,
            selection_score: selection.confidence,
            routing_time_ms,
            execution_success: None,
            execution_time_ms: None,
            cost_actual_cents: None,
            task_metadata: serde_json::json!({
                "project_id": task.project_id,
                "user_id": task.user_id,
                "priority": task.priority,
                "candidates_considered": selection.metadata.candidates_considered,
                "fallback_count": selection.fallback_agents.len(),
            }),
            created_at: now,
        };
        if let Err(e) = self.store.insert_routing_record(&record).await {
            warn!(routing_id = %routing_id, error = %e, "Failed to persist routing record");
        }

        self.load.increment(selection.agent_id);

        info!(
            routing_id = %routing_id,
            agent = %selection.agent_name,
            confidence = selection.confidence,
            fallbacks = selection.fallback_agents.len(),
            "Agent selected"
        );

        routing_id
    }

    /// Pick then commit in one step, for callers that apply no overrides.
    ///
    /// # Errors
    /// Returns `NoCapableAgent` when `candidates` is empty.
    pub async fn select(
        &self,
        task: &TaskContext,
        candidates: Vec<ScoredCandidate>,
        routing_time_ms: f64,
        now: DateTime<Utc>,
    ) -> RouterResult<(RoutingId, AgentSelection)> {
        let selection = self.pick(task, candidates, now).await?;
        let routing_id = self.commit(task, &selection, routing_time_ms, now).await;
        Ok((routing_id, selection))
    }

    async fn estimate_completion(
        &self,
        agent: &Agent,
        task: &TaskContext,
        now: DateTime<Utc>,
    ) -> f64 {
        let base_seconds = match self
            .store
            .pairing_stats(
                agent.id,
                &task.task_type,
                task.complexity,
                now - Duration::days(ESTIMATE_WINDOW_DAYS),
            )
            .await
        {
            Ok(stats) => stats
                .avg_execution_ms
                .map_or_else(|| task.complexity.default_completion_seconds(), |ms| ms / 1000.0),
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "Completion estimate degraded to default");
                task.complexity.default_completion_seconds()
            }
        };

        let load_multiplier = 1.0 + f64::from(self.load.count(agent.id)) * LOAD_TIME_FACTOR;
        base_seconds * load_multiplier
    }

    async fn estimate_cost(&self, agent: &Agent, task: &TaskContext, now: DateTime<Utc>) -> i64 {
        match self
            .store
            .pairing_stats(
                agent.id,
                &task.task_type,
                task.complexity,
                now - Duration::days(ESTIMATE_WINDOW_DAYS),
            )
            .await
        {
            Ok(stats) => stats
                .avg_cost_cents
                .map_or_else(|| task.complexity.default_cost_cents(), |c| c.round() as i64),
            Err(e) => {
                warn!(agent_id = %agent.id, error = %e, "Cost estimate degraded to default");
                task.complexity.default_cost_cents()
            }
        }
    }
}

/// Assemble the human-readable selection rationale from up to three
/// score-derived reasons.
fn build_reason(score: &PerformanceScore, task: &TaskContext) -> String {
    let mut reasons: Vec<String> = Vec::new();

    if score.reliability >= 0.9 {
        reasons.push(format!("high reliability ({:.1}%)", score.reliability * 100.0));
    }
    if score.performance >= 0.8 {
        reasons.push("excellent response time".to_string());
    }
    if score.cost_efficiency >= 0.8 {
        reasons.push("cost efficient".to_string());
    }
    if score.load >= 0.9 {
        reasons.push("low current load".to_string());
    }
    if score.historical >= 0.8 {
        reasons.push(format!(
            "strong performance on similar {} tasks",
            task.complexity.as_str()
        ));
    }

    if reasons.is_empty() {
        reasons.push("best available option".to_string());
    }

    format!("Selected for {}.", reasons[..reasons.len().min(3)].join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{TaskComplexity, TaskContext};
    use router_storage::MemoryStore;

    fn setup() -> (Arc<MemoryStore>, Arc<LoadTracker>, Selector) {
        let store = Arc::new(MemoryStore::new());
        let load = Arc::new(LoadTracker::new(10));
        let selector = Selector::new(store.clone(), load.clone());
        (store, load, selector)
    }

    fn scored(name: &str, overall: f64) -> ScoredCandidate {
        ScoredCandidate {
            agent: Agent::new(name, "anthropic"),
            score: PerformanceScore {
                overall,
                reliability: 0.8,
                performance: 0.7,
                cost_efficiency: 0.7,
                capability_match: 0.8,
                load: 1.0,
                historical: 0.7,
            },
        }
    }

    fn task() -> TaskContext {
        TaskContext::builder("summarize", TaskComplexity::Moderate).build()
    }

    #[tokio::test]
    async fn test_selects_highest_overall() {
        let (_, _, selector) = setup();
        let candidates = vec![scored("a1", 0.6), scored("a2", 0.9), scored("a3", 0.7)];

        let (_, selection) = selector
            .select(&task(), candidates, 1.0, Utc::now())
            .await
            .unwrap();
        assert_eq!(selection.agent_name, "a2");
        assert!((selection.confidence - 0.9).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_fallbacks_are_next_three() {
        let (_, _, selector) = setup();
        let candidates = vec![
            scored("a1", 0.9),
            scored("a2", 0.8),
            scored("a3", 0.7),
            scored("a4", 0.6),
            scored("a5", 0.5),
        ];
        let expected: Vec<_> = vec![
            candidates[1].agent.id,
            candidates[2].agent.id,
            candidates[3].agent.id,
        ];

        let (_, selection) = selector
            .select(&task(), candidates, 1.0, Utc::now())
            .await
            .unwrap();
        assert_eq!(selection.fallback_agents, expected);
    }

    #[tokio::test]
    async fn test_single_candidate_has_no_fallbacks() {
        let (_, _, selector) = setup();
        let (_, selection) = selector
            .select(&task(), vec![scored("only", 0.8)], 1.0, Utc::now())
            .await
            .unwrap();
        assert!(selection.fallback_agents.is_empty());
    }

    #[tokio::test]
    async fn test_defaults_for_estimates_without_history() {
        let (_, _, selector) = setup();
        let (_, selection) = selector
            .select(&task(), vec![scored("a1", 0.8)], 1.0, Utc::now())
            .await
            .unwrap();
        assert!((selection.estimated_completion_seconds - 10.0).abs() < 1e-9);
        assert_eq!(selection.estimated_cost_cents, 5);
    }

    #[tokio::test]
    async fn test_load_inflates_completion_estimate() {
        let (_, load, selector) = setup();
        let candidate = scored("busy", 0.8);
        load.set_count(candidate.agent.id, 4);

        let (_, selection) = selector
            .select(&task(), vec![candidate], 1.0, Utc::now())
            .await
            .unwrap();
        // 10s default * (1 + 0.1*4): the winner's own increment lands
        // after the estimate, so 4 in-flight at estimate time.
        assert!((selection.estimated_completion_seconds - 14.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_routing_record_emitted_and_load_incremented() {
        let (store, load, selector) = setup();
        let candidate = scored("a1", 0.8);
        let agent_id = candidate.agent.id;

        let (routing_id, _) = selector
            .select(&task(), vec![candidate], 2.5, Utc::now())
            .await
            .unwrap();

        let record = store.get_routing_record(routing_id).await.unwrap().unwrap();
        assert_eq!(record.agent_id, agent_id);
        assert!(!record.is_resolved());
        assert!((record.routing_time_ms - 2.5).abs() < f64::EPSILON);
        assert_eq!(load.count(agent_id), 1);
    }

    #[tokio::test]
    async fn test_empty_candidates_is_no_capable_agent() {
        let (_, load, selector) = setup();
        let err = selector
            .select(&task(), vec![], 1.0, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "NoCapableAgent");
        assert_eq!(load.total_in_flight(), 0);
    }

    #[test]
    fn test_reason_assembly() {
        let score = PerformanceScore {
            overall: 0.9,
            reliability: 0.95,
            performance: 0.85,
            cost_efficiency: 0.9,
            capability_match: 0.8,
            load: 0.95,
            historical: 0.85,
        };
        let reason = build_reason(&score, &task());
        assert!(reason.starts_with("Selected for high reliability (95.0%)"));
        // Capped at three reasons.
        assert_eq!(reason.matches(", ").count(), 2);

        let weak = PerformanceScore {
            overall: 0.4,
            reliability: 0.5,
            performance: 0.5,
            cost_efficiency: 0.5,
            capability_match: 0.8,
            load: 0.7,
            historical: 0.5,
        };
        assert_eq!(build_reason(&weak, &task()), "Selected for best available option.");
    }
}

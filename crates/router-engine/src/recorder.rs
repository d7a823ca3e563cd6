//! Outcome recording.
//!
//! Applies a reported outcome to the routing record, circuit breaker,
//! load tracker, score cache, and learning engine. The live in-memory
//! state is updated even when the durable write fails; the ack reports
//! whether persistence happened inline or was deferred.

use chrono::{DateTime, Utc};
use router_core::{
    RouterError, RouterResult, RoutingId, RoutingRecord, TaskOutcome,
};
use router_learning::LearningEngine;
use router_resilience::{BreakerRegistry, LoadTracker};
use router_scoring::Scorer;
use router_storage::{
    AgentStore as _, MetricsStore as _, OutcomeStore as _, ResolveOutcome, Storage,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Caller-supplied outcome report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// The routing decision being resolved.
    pub routing_id: RoutingId,
    /// Whether the execution succeeded.
    pub success: bool,
    /// Execution time in milliseconds.
    pub execution_ms: f64,
    /// Actual cost in cents, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_cents: Option<i64>,
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
}

/// Acknowledgement of a recorded outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordAck {
    /// The outcome was applied to live state.
    pub recorded: bool,
    /// The durable write completed inline; false means it was deferred.
    pub durable: bool,
}

/// Records task outcomes and fans the update out to the live state.
pub struct OutcomeRecorder {
    store: Arc<dyn Storage>,
    breakers: Arc<BreakerRegistry>,
    load: Arc<LoadTracker>,
    scorer: Arc<Scorer>,
    learning: Arc<LearningEngine>,
}

impl OutcomeRecorder {
    /// Create a recorder over shared components.
    #[must_use]
    pub fn new(
        store: Arc<dyn Storage>,
        breakers: Arc<BreakerRegistry>,
        load: Arc<LoadTracker>,
        scorer: Arc<Scorer>,
        learning: Arc<LearningEngine>,
    ) -> Self {
        Self {
            store,
            breakers,
            load,
            scorer,
            learning,
        }
    }

    /// Record an outcome report.
    ///
    /// A repeated report for an already-resolved routing id is a no-op:
    /// it acks when the values match the stored resolution and returns
    /// `OutcomeNotFound` otherwise. Live state is never touched twice.
    ///
    /// # Errors
    /// `OutcomeNotFound` when no routing record matches the id.
    pub async fn record(&self, report: OutcomeReport) -> RouterResult<RecordAck> {
        let now = Utc::now();

        let record = self
            .store
            .get_routing_record(report.routing_id)
            .await?
            .ok_or_else(|| RouterError::outcome_not_found(report.routing_id.to_string()))?;

        if record.is_resolved() {
            return self.ack_duplicate(&record, &report);
        }

        let resolve = self
            .store
            .resolve_routing_record(
                report.routing_id,
                record.agent_id,
                report.success,
                report.execution_ms,
                report.cost_cents,
                now,
            )
            .await;
        let mut durable = match resolve {
            Ok(ResolveOutcome::Updated) => true,
            Ok(ResolveOutcome::AlreadyResolved) => {
                // Another reporter raced us; treat as the duplicate path.
                return self.ack_duplicate(&record, &report);
            }
            Ok(ResolveOutcome::NotFound) => {
                // The record aged out of the resolution window; the
                // outcome still feeds live state and learning.
                debug!(routing_id = %report.routing_id, "Routing record outside resolution window");
                true
            }
            Err(e) => {
                warn!(routing_id = %report.routing_id, error = %e, "Routing record update failed");
                false
            }
        };

        // Breaker counters move on every outcome; state transitions are
        // the breaker's own concern.
        let breaker = self.breakers.get_or_create(record.agent_id);
        if report.success {
            breaker.record_success();
        } else {
            breaker.record_failure(now);
        }
        if let Err(e) = self.store.upsert_breaker(&breaker.snapshot()).await {
            warn!(agent_id = %record.agent_id, error = %e, "Breaker persistence deferred");
        }

        self.load.decrement(record.agent_id);
        self.scorer.invalidate(record.agent_id);

        let outcome = build_outcome(&record, &report, now);
        self.learning.ingest(outcome.clone(), now).await;

        // Durable outcome write: retry once inline, then hand off to a
        // background task so the caller is not blocked on a flaky store.
        match self.store.insert_outcome(&outcome).await {
            Ok(_) => {}
            Err(first_err) => {
                warn!(routing_id = %report.routing_id, error = %first_err, "Outcome write failed, retrying");
                if let Err(second_err) = self.store.insert_outcome(&outcome).await {
                    warn!(
                        routing_id = %report.routing_id,
                        error = %second_err,
                        "Outcome write failed twice, queueing background retry"
                    );
                    durable = false;
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                        if let Err(e) = store.insert_outcome(&outcome).await {
                            warn!(error = %e, "Queued outcome write failed, dropping");
                        }
                    });
                }
            }
        }

        info!(
            routing_id = %report.routing_id,
            agent_id = %record.agent_id,
            success = report.success,
            execution_ms = report.execution_ms,
            durable,
            "Outcome recorded"
        );

        Ok(RecordAck {
            recorded: true,
            durable,
        })
    }

    fn ack_duplicate(
        &self,
        record: &RoutingRecord,
        report: &OutcomeReport,
    ) -> RouterResult<RecordAck> {
        let same_values = record.execution_success == Some(report.success)
            && record
                .execution_time_ms
                .is_some_and(|ms| (ms - report.execution_ms).abs() < f64::EPSILON);
        if same_values {
            debug!(routing_id = %report.routing_id, "Duplicate outcome report ignored");
            Ok(RecordAck {
                recorded: true,
                durable: true,
            })
        } else {
            Err(RouterError::outcome_not_found(report.routing_id.to_string()))
        }
    }
}

fn build_outcome(
    record: &RoutingRecord,
    report: &OutcomeReport,
    now: DateTime<Utc>,
) -> TaskOutcome {
    let success_score =
        TaskOutcome::derive_success_score(report.success, &report.quality_metrics);
    TaskOutcome {
        routing_id: report.routing_id,
        agent_id: record.agent_id,
        task_type: record.task_type.clone(),
        complexity: record.complexity,
        success_score,
        completion_seconds: report.execution_ms / 1000.0,
        quality_metrics: report.quality_metrics.clone(),
        user_satisfaction: report.user_satisfaction,
        error_count: report.error_count,
        retry_attempts: report.retry_attempts,
        cost_actual_cents: report.cost_cents,
        context_metadata: record.task_metadata.clone(),
        recorded_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{AgentId, PerformanceScore, TaskComplexity, TaskContext};
    use router_learning::LearningParams;
    use router_registry::Agent;
    use router_resilience::{CircuitBreakerConfig, CircuitState};
    use router_scoring::{ScoredCandidate, Selector};
    use router_storage::{AgentStore as _, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        breakers: Arc<BreakerRegistry>,
        load: Arc<LoadTracker>,
        scorer: Arc<Scorer>,
        learning: Arc<LearningEngine>,
        selector: Selector,
        recorder: OutcomeRecorder,
    }

    fn fixture() -> Fixture {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let load = Arc::new(LoadTracker::new(10));
        let scorer = Arc::new(Scorer::new(store.clone(), load.clone()));
        let learning = Arc::new(LearningEngine::new(LearningParams::default(), store.clone()));
        let selector = Selector::new(store.clone(), load.clone());
        let recorder = OutcomeRecorder::new(
            store.clone(),
            breakers.clone(),
            load.clone(),
            scorer.clone(),
            learning.clone(),
        );
        Fixture {
            store,
            breakers,
            load,
            scorer,
            learning,
            selector,
            recorder,
        }
    }

    fn scored(agent: &Agent) -> ScoredCandidate {
        ScoredCandidate {
            agent: agent.clone(),
            score: PerformanceScore::from_components(0.8, 0.8, 0.8, 0.8, 0.8),
        }
    }

    async fn dispatch(f: &Fixture, agent: &Agent) -> RoutingId {
        let task = TaskContext::builder("summarize", TaskComplexity::Moderate).build();
        let (routing_id, _) = f
            .selector
            .select(&task, vec![scored(agent)], 1.0, Utc::now())
            .await
            .unwrap();
        routing_id
    }

    fn report(routing_id: RoutingId, success: bool) -> OutcomeReport {
        OutcomeReport {
            routing_id,
            success,
            execution_ms: 800.0,
            cost_cents: Some(4),
            quality_metrics: BTreeMap::new(),
            user_satisfaction: None,
            error_count: 0,
            retry_attempts: 0,
        }
    }

    #[tokio::test]
    async fn test_record_success_updates_everything() {
        let f = fixture();
        let agent = Agent::new("a1", "anthropic");
        let routing_id = dispatch(&f, &agent).await;
        assert_eq!(f.load.count(agent.id), 1);

        let ack = f.recorder.record(report(routing_id, true)).await.unwrap();
        assert!(ack.recorded);
        assert!(ack.durable);

        // Record resolved, load released, outcome persisted, breaker counted.
        let record = f.store.get_routing_record(routing_id).await.unwrap().unwrap();
        assert_eq!(record.execution_success, Some(true));
        assert_eq!(f.load.count(agent.id), 0);
        assert_eq!(f.store.outcome_count(), 1);
        let snapshot = f.breakers.get_or_create(agent.id).snapshot();
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(f.learning.stats().outcomes_processed, 1);
    }

    #[tokio::test]
    async fn test_record_unknown_routing_id() {
        let f = fixture();
        let err = f
            .recorder
            .record(report(RoutingId::new(), true))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "OutcomeNotFound");
    }

    #[tokio::test]
    async fn test_duplicate_report_is_noop() {
        let f = fixture();
        let agent = Agent::new("a1", "anthropic");
        let routing_id = dispatch(&f, &agent).await;

        f.recorder.record(report(routing_id, true)).await.unwrap();
        assert_eq!(f.load.count(agent.id), 0);

        // Same values: acked without double-applying.
        let ack = f.recorder.record(report(routing_id, true)).await.unwrap();
        assert!(ack.recorded);
        assert_eq!(f.load.count(agent.id), 0);
        assert_eq!(f.store.outcome_count(), 1);
        let snapshot = f.breakers.get_or_create(agent.id).snapshot();
        assert_eq!(snapshot.success_count, 1);

        // Conflicting values: rejected.
        let err = f.recorder.record(report(routing_id, false)).await.unwrap_err();
        assert_eq!(err.kind(), "OutcomeNotFound");
    }

    #[tokio::test]
    async fn test_failures_feed_the_breaker() {
        let f = fixture();
        let agent = Agent::new("flaky", "anthropic");

        for _ in 0..5 {
            let routing_id = dispatch(&f, &agent).await;
            f.recorder.record(report(routing_id, false)).await.unwrap();
        }

        let breaker = f.breakers.get_or_create(agent.id);
        assert_eq!(breaker.state(), CircuitState::Open);
        // Persisted alongside.
        let stored = f.store.load_breakers().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].failure_count, 5);
    }

    #[tokio::test]
    async fn test_quality_metrics_shape_success_score() {
        let f = fixture();
        let agent = Agent::new("a1", "anthropic");
        let routing_id = dispatch(&f, &agent).await;

        let mut quality = BTreeMap::new();
        quality.insert("coherence".to_string(), 0.6);
        let mut r = report(routing_id, true);
        r.quality_metrics = quality;
        f.recorder.record(r).await.unwrap();

        let outcomes = f
            .store
            .recent_outcomes(Utc::now() - chrono::Duration::hours(1), 10)
            .await
            .unwrap();
        // (1.0 + 0.6) / 2
        assert!((outcomes[0].success_score - 0.8).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_score_cache_invalidated_on_outcome() {
        let f = fixture();
        let agent = Agent::new("a1", "anthropic");
        let task = TaskContext::builder("summarize", TaskComplexity::Moderate).build();

        let _ = f.scorer.score(agent.id, &task, Utc::now()).await;
        assert_eq!(f.scorer.cache_size(), 1);

        let routing_id = dispatch(&f, &agent).await;
        f.recorder.record(report(routing_id, true)).await.unwrap();
        assert_eq!(f.scorer.cache_size(), 0);
    }
}

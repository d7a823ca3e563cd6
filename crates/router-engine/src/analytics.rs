//! Routing and learning analytics.

use chrono::{DateTime, Duration, Utc};
use router_core::{AgentId, AgentSpecialization, RouterResult, RoutingOptimization};
use router_learning::{LearningEngine, LearningStats};
use router_resilience::{BreakerRegistry, CircuitBreakerSnapshot, CircuitState, LoadTracker};
use router_scoring::Scorer;
use router_storage::{
    AgentAnalytics, LearningStore as _, MetricsStore as _, OverviewStats, Storage,
    TaskTypeAnalytics,
};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Window for the prediction-accuracy trend.
const ACCURACY_WINDOW_DAYS: i64 = 30;

/// Routing analytics for a time window.
#[derive(Debug, Clone, Serialize)]
pub struct RoutingAnalytics {
    /// Window covered, in hours.
    pub window_hours: u32,
    /// Window totals.
    pub overall: OverviewStats,
    /// Per-agent breakdown.
    pub per_agent: Vec<AgentAnalytics>,
    /// Per-task-type breakdown.
    pub per_task_type: Vec<TaskTypeAnalytics>,
    /// Breakers that are not quietly closed.
    pub breakers: Vec<CircuitBreakerSnapshot>,
    /// Current in-flight load distribution.
    pub loads: HashMap<AgentId, u32>,
    /// Cached performance scores held in memory.
    pub score_cache_size: usize,
}

/// Learning analytics summary.
#[derive(Debug, Clone, Serialize)]
pub struct LearningAnalytics {
    /// In-memory engine statistics.
    pub stats: LearningStats,
    /// Active specializations, highest confidence first.
    pub active_specializations: Vec<AgentSpecialization>,
    /// Recent optimization snapshots, newest first.
    pub optimization_history: Vec<RoutingOptimization>,
    /// Mean prediction accuracy over the recent window.
    pub prediction_accuracy: Option<f64>,
}

/// Assembles analytics from the live components and the store.
pub struct AnalyticsReporter {
    store: Arc<dyn Storage>,
    breakers: Arc<BreakerRegistry>,
    load: Arc<LoadTracker>,
    scorer: Arc<Scorer>,
    learning: Arc<LearningEngine>,
}

impl AnalyticsReporter {
    /// Create a reporter over shared components.
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

    /// Routing analytics over the given window.
    pub async fn routing(&self, window_hours: u32, now: DateTime<Utc>) -> RouterResult<RoutingAnalytics> {
        let since = now - Duration::hours(i64::from(window_hours));

        let overall = self.store.routing_overview(since).await?;
        let per_agent = self.store.per_agent_analytics(since).await?;
        let per_task_type = self.store.task_type_analytics(since).await?;

        let breakers = self
            .breakers
            .snapshots()
            .into_iter()
            .filter(|b| b.state != CircuitState::Closed || b.failure_count > 0)
            .collect();

        Ok(RoutingAnalytics {
            window_hours,
            overall,
            per_agent,
            per_task_type,
            breakers,
            loads: self.load.distribution(),
            score_cache_size: self.scorer.cache_size(),
        })
    }

    /// Learning analytics.
    pub async fn learning(&self, now: DateTime<Utc>) -> RouterResult<LearningAnalytics> {
        let optimization_history = self.store.optimization_history(10).await?;
        let prediction_accuracy = self
            .store
            .prediction_accuracy(now - Duration::days(ACCURACY_WINDOW_DAYS))
            .await?;

        Ok(LearningAnalytics {
            stats: self.learning.stats(),
            active_specializations: self.learning.active_specializations(),
            optimization_history,
            prediction_accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{RoutingId, RoutingRecord, TaskComplexity};
    use router_learning::LearningParams;
    use router_resilience::CircuitBreakerConfig;
    use router_storage::{MemoryStore, MetricsStore as _};

    fn reporter() -> (Arc<MemoryStore>, Arc<BreakerRegistry>, AnalyticsReporter) {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let load = Arc::new(LoadTracker::new(10));
        let scorer = Arc::new(Scorer::new(store.clone(), load.clone()));
        let learning = Arc::new(LearningEngine::new(LearningParams::default(), store.clone()));
        let reporter = AnalyticsReporter::new(
            store.clone(),
            breakers.clone(),
            load.clone(),
            scorer,
            learning,
        );
        (store, breakers, reporter)
    }

    #[tokio::test]
    async fn test_routing_analytics_shape() {
        let (store, breakers, reporter) = reporter();
        let agent = AgentId::new();
        let now = Utc::now();

        for i in 0..4 {
            let record = RoutingRecord {
                routing_id: RoutingId::new(),
                agent_id: agent,
                task_type: "summarize".to_string(),
                complexity: TaskComplexity::Moderate,
                selection_score: 0.8,
                routing_time_ms: 2.0,
                execution_success: None,
                execution_time_ms: None,
                cost_actual_cents: None,
                task_metadata: serde_json::Value::Null,
                created_at: now,
            };
            let routing_id = record.routing_id;
            store.insert_routing_record(&record).await.unwrap();
            store
                .resolve_routing_record(routing_id, agent, i % 2 == 0, 600.0, Some(5), now)
                .await
                .unwrap();
        }

        // One noisy breaker.
        let breaker = breakers.get_or_create(AgentId::new());
        breaker.record_failure(now);

        let analytics = reporter.routing(24, now).await.unwrap();
        assert_eq!(analytics.overall.total_routings, 4);
        assert!((analytics.overall.success_rate.unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(analytics.per_agent.len(), 1);
        assert_eq!(analytics.per_task_type.len(), 1);
        assert_eq!(analytics.breakers.len(), 1);
    }

    #[tokio::test]
    async fn test_learning_analytics_shape() {
        let (_, _, reporter) = reporter();
        let analytics = reporter.learning(Utc::now()).await.unwrap();
        assert_eq!(analytics.stats.outcomes_in_memory, 0);
        assert!(analytics.active_specializations.is_empty());
        assert!(analytics.optimization_history.is_empty());
        assert!(analytics.prediction_accuracy.is_none());
    }
}

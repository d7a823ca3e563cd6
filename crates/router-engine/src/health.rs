//! Agent health monitoring.

use chrono::{DateTime, Duration, Utc};
use router_core::{AgentHealthStatus, AgentId, AgentStatus, RouterResult};
use router_registry::Registry;
use router_resilience::LoadTracker;
use router_storage::{MetricsStore as _, Storage};
use std::sync::Arc;
use tracing::warn;

/// Window for health-rate aggregates.
const HEALTH_WINDOW_HOURS: i64 = 1;
/// Window for the predictive failure estimator.
const FAILURE_WINDOW_HOURS: i64 = 2;
/// Recent executions considered by the failure estimator.
const FAILURE_SAMPLE_LIMIT: u32 = 20;

/// Aggregates per-agent health summaries.
pub struct HealthMonitor {
    registry: Arc<Registry>,
    load: Arc<LoadTracker>,
    store: Arc<dyn Storage>,
}

impl HealthMonitor {
    /// Create a monitor over shared components.
    #[must_use]
    pub fn new(registry: Arc<Registry>, load: Arc<LoadTracker>, store: Arc<dyn Storage>) -> Self {
        Self {
            registry,
            load,
            store,
        }
    }

    /// Health summaries for every registered active or inactive agent.
    pub async fn statuses(&self, now: DateTime<Utc>) -> Vec<AgentHealthStatus> {
        let mut statuses = Vec::new();
        for agent in self.registry.all() {
            if !matches!(agent.status, AgentStatus::Active | AgentStatus::Inactive) {
                continue;
            }

            let stats = match self
                .store
                .agent_stats(agent.id, now - Duration::hours(HEALTH_WINDOW_HOURS))
                .await
            {
                Ok(stats) => stats,
                Err(e) => {
                    warn!(agent_id = %agent.id, error = %e, "Health stats unavailable");
                    router_storage::AgentStats::default()
                }
            };

            let success_rate = stats.success_rate.unwrap_or(0.0);
            let error_rate = stats.success_rate.map_or(0.0, |rate| 1.0 - rate);
            let failure_score = self.predictive_failure_score(agent.id, now).await;

            statuses.push(AgentHealthStatus {
                agent_id: agent.id,
                name: agent.name,
                status: agent.status,
                load_level: self.load.load_level(agent.id),
                success_rate,
                error_rate,
                p95_response_ms: stats.p95_execution_ms.unwrap_or(0.0),
                cost_per_request_cents: stats.avg_cost_cents.unwrap_or(0.0),
                last_health_check: now,
                predictive_failure_score: failure_score,
                capacity_utilization: self.load.ratio(agent.id),
            });
        }
        statuses
    }

    /// Weighted recent-failure estimate: newer failures count more
    /// (`1/(i+1)` by recency), and the final rate is amplified by 1.5
    /// and capped at 1.0.
    pub async fn predictive_failure_score(&self, agent_id: AgentId, now: DateTime<Utc>) -> f64 {
        let results: RouterResult<Vec<bool>> = self
            .store
            .recent_execution_results(
                agent_id,
                now - Duration::hours(FAILURE_WINDOW_HOURS),
                FAILURE_SAMPLE_LIMIT,
            )
            .await;

        let results = match results {
            Ok(results) => results,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Failure history unavailable");
                return 0.0;
            }
        };
        if results.is_empty() {
            return 0.0;
        }

        let mut weighted_failures = 0.0;
        let mut total_weight = 0.0;
        for (i, success) in results.iter().enumerate() {
            let weight = 1.0 / (i as f64 + 1.0);
            if !success {
                weighted_failures += weight;
            }
            total_weight += weight;
        }

        let weighted_rate = if total_weight > 0.0 {
            weighted_failures / total_weight
        } else {
            0.0
        };
        (weighted_rate * 1.5).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::{LoadLevel, RoutingId, RoutingRecord, TaskComplexity};
    use router_registry::Agent;
    use router_storage::{MemoryStore, MetricsStore as _};

    fn fixture() -> (Arc<MemoryStore>, Arc<Registry>, Arc<LoadTracker>, HealthMonitor) {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::new());
        let load = Arc::new(LoadTracker::new(10));
        let monitor = HealthMonitor::new(registry.clone(), load.clone(), store.clone());
        (store, registry, load, monitor)
    }

    async fn record_result(store: &MemoryStore, agent: AgentId, success: bool, now: DateTime<Utc>) {
        let record = RoutingRecord {
            routing_id: RoutingId::new(),
            agent_id: agent,
            task_type: "summarize".to_string(),
            complexity: TaskComplexity::Moderate,
            selection_score: 0.8,
            routing_time_ms: 1.0,
            execution_success: None,
            execution_time_ms: None,
            cost_actual_cents: None,
            task_metadata: serde_json::Value::Null,
            created_at: now,
        };
        let routing_id = record.routing_id;
        store.insert_routing_record(&record).await.unwrap();
        store
            .resolve_routing_record(routing_id, agent, success, 500.0, Some(3), now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_statuses_cover_registered_agents() {
        let (store, registry, load, monitor) = fixture();
        let now = Utc::now();

        let active = Agent::new("active-1", "anthropic");
        let active_id = active.id;
        registry.register(active);
        let mut inactive = Agent::new("inactive-1", "openai");
        inactive.status = AgentStatus::Inactive;
        registry.register(inactive);
        let mut failed = Agent::new("failed-1", "openai");
        failed.status = AgentStatus::Failed;
        registry.register(failed);

        record_result(&store, active_id, true, now).await;
        record_result(&store, active_id, false, now).await;
        load.set_count(active_id, 5);

        let statuses = monitor.statuses(now).await;
        // FAILED agents are excluded from the health report.
        assert_eq!(statuses.len(), 2);

        let active_status = statuses.iter().find(|s| s.agent_id == active_id).unwrap();
        assert!((active_status.success_rate - 0.5).abs() < 1e-9);
        assert!((active_status.error_rate - 0.5).abs() < 1e-9);
        assert_eq!(active_status.load_level, LoadLevel::Medium);
        assert!((active_status.capacity_utilization - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_predictive_failure_weights_recent_failures() {
        let (store, _, _, monitor) = fixture();
        let agent = AgentId::new();
        let now = Utc::now();

        // Older successes, then recent failures.
        for i in 0..6 {
            let at = now - Duration::minutes(60 - i * 10);
            record_result(&store, agent, i < 3, at).await;
        }

        let score = monitor.predictive_failure_score(agent, now).await;
        // Failures are the three most recent: heavily weighted.
        assert!(score > 0.5);
        assert!(score <= 1.0);

        // An agent with no history carries no failure signal.
        let fresh = monitor.predictive_failure_score(AgentId::new(), now).await;
        assert!(fresh.abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_all_success_scores_zero() {
        let (store, _, _, monitor) = fixture();
        let agent = AgentId::new();
        let now = Utc::now();
        for _ in 0..5 {
            record_result(&store, agent, true, now).await;
        }
        let score = monitor.predictive_failure_score(agent, now).await;
        assert!(score.abs() < f64::EPSILON);
    }
}

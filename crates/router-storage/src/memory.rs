//! In-memory store implementation.
//!
//! Backs storeless deployments and tests. All operations are short
//! critical sections over process-local state; nothing survives restart.

use crate::stores::{
    AgentAnalytics, AgentStats, AgentStore, LearningStore, MetricsStore, OutcomeStore,
    OverviewStats, PairingStats, PerformanceGroup, PerformanceSnapshotRow, ResolveOutcome,
    TaskTypeAnalytics,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use router_core::{
    AgentId, AgentSpecialization, RouterResult, RoutingId, RoutingOptimization, RoutingRecord,
    SuccessPrediction, TaskComplexity, TaskOutcome,
};
use router_registry::Agent;
use router_resilience::CircuitBreakerSnapshot;
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    routing_records: Vec<RoutingRecord>,
    outcomes: Vec<(Uuid, TaskOutcome)>,
    specializations: HashMap<(AgentId, String), AgentSpecialization>,
    optimizations: Vec<RoutingOptimization>,
    predictions: Vec<SuccessPrediction>,
    learning_metrics: Vec<(String, f64, serde_json::Value, DateTime<Utc>)>,
    snapshots: Vec<PerformanceSnapshotRow>,
    agents: HashMap<AgentId, Agent>,
    breakers: HashMap<AgentId, CircuitBreakerSnapshot>,
}

/// Process-local store implementing every store trait.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of routing records held (for tests and diagnostics).
    #[must_use]
    pub fn routing_record_count(&self) -> usize {
        self.state.read().routing_records.len()
    }

    /// Number of outcomes held (for tests and diagnostics).
    #[must_use]
    pub fn outcome_count(&self) -> usize {
        self.state.read().outcomes.len()
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = values.iter().sum::<f64>() / values.len() as f64;
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

fn percentile_95(mut values: Vec<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let rank = ((values.len() as f64) * 0.95).ceil() as usize;
    Some(values[rank.saturating_sub(1).min(values.len() - 1)])
}

#[async_trait]
impl MetricsStore for MemoryStore {
    async fn insert_routing_record(&self, record: &RoutingRecord) -> RouterResult<()> {
        self.state.write().routing_records.push(record.clone());
        Ok(())
    }

    async fn resolve_routing_record(
        &self,
        routing_id: RoutingId,
        agent_id: AgentId,
        success: bool,
        execution_time_ms: f64,
        cost_actual_cents: Option<i64>,
        now: DateTime<Utc>,
    ) -> RouterResult<ResolveOutcome> {
        let mut state = self.state.write();
        let cutoff = now - Duration::minutes(1);
        let record = state
            .routing_records
            .iter_mut()
            .filter(|r| r.routing_id == routing_id && r.agent_id == agent_id)
            .find(|r| r.created_at >= cutoff);

        match record {
            Some(record) if record.execution_success.is_some() => Ok(ResolveOutcome::AlreadyResolved),
            Some(record) => {
                record.execution_success = Some(success);
                record.execution_time_ms = Some(execution_time_ms);
                record.cost_actual_cents = cost_actual_cents;
                Ok(ResolveOutcome::Updated)
            }
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    async fn get_routing_record(
        &self,
        routing_id: RoutingId,
    ) -> RouterResult<Option<RoutingRecord>> {
        Ok(self
            .state
            .read()
            .routing_records
            .iter()
            .find(|r| r.routing_id == routing_id)
            .cloned())
    }

    async fn agent_stats(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> RouterResult<AgentStats> {
        let state = self.state.read();
        let records: Vec<&RoutingRecord> = state
            .routing_records
            .iter()
            .filter(|r| r.agent_id == agent_id && r.created_at >= since)
            .collect();

        let successes: Vec<f64> = records
            .iter()
            .filter_map(|r| r.execution_success.map(|s| if s { 1.0 } else { 0.0 }))
            .collect();
        let times: Vec<f64> = records.iter().filter_map(|r| r.execution_time_ms).collect();
        let costs: Vec<f64> = records
            .iter()
            .filter_map(|r| r.cost_actual_cents.map(|c| c as f64))
            .collect();

        let avg_execution_ms = mean(&times);
        Ok(AgentStats {
            total_requests: records.len() as u64,
            success_rate: mean(&successes),
            avg_execution_ms,
            avg_cost_cents: mean(&costs),
            p95_execution_ms: percentile_95(times),
        })
    }

    async fn pairing_stats(
        &self,
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        since: DateTime<Utc>,
    ) -> RouterResult<PairingStats> {
        let state = self.state.read();
        let records: Vec<&RoutingRecord> = state
            .routing_records
            .iter()
            .filter(|r| {
                r.agent_id == agent_id
                    && r.task_type == task_type
                    && r.complexity == complexity
                    && r.created_at >= since
            })
            .collect();

        let successes: Vec<f64> = records
            .iter()
            .filter_map(|r| r.execution_success.map(|s| if s { 1.0 } else { 0.0 }))
            .collect();
        let times: Vec<f64> = records.iter().filter_map(|r| r.execution_time_ms).collect();
        let costs: Vec<f64> = records
            .iter()
            .filter_map(|r| r.cost_actual_cents.map(|c| c as f64))
            .collect();

        Ok(PairingStats {
            sample_size: records.len() as u64,
            success_rate: mean(&successes),
            avg_execution_ms: mean(&times),
            avg_cost_cents: mean(&costs),
        })
    }

    async fn recent_execution_results(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RouterResult<Vec<bool>> {
        let state = self.state.read();
        let mut records: Vec<&RoutingRecord> = state
            .routing_records
            .iter()
            .filter(|r| {
                r.agent_id == agent_id && r.created_at >= since && r.execution_success.is_some()
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records
            .into_iter()
            .take(limit as usize)
            .filter_map(|r| r.execution_success)
            .collect())
    }

    async fn insert_performance_snapshot(&self, row: &PerformanceSnapshotRow) -> RouterResult<()> {
        self.state.write().snapshots.push(row.clone());
        Ok(())
    }

    async fn routing_overview(&self, since: DateTime<Utc>) -> RouterResult<OverviewStats> {
        let state = self.state.read();
        let records: Vec<&RoutingRecord> = state
            .routing_records
            .iter()
            .filter(|r| r.created_at >= since)
            .collect();

        let routing_times: Vec<f64> = records.iter().map(|r| r.routing_time_ms).collect();
        let successes: Vec<f64> = records
            .iter()
            .filter_map(|r| r.execution_success.map(|s| if s { 1.0 } else { 0.0 }))
            .collect();
        let mut agents: Vec<AgentId> = records.iter().map(|r| r.agent_id).collect();
        agents.sort_unstable();
        agents.dedup();

        Ok(OverviewStats {
            total_routings: records.len() as u64,
            avg_routing_ms: mean(&routing_times),
            success_rate: mean(&successes),
            unique_agents: agents.len() as u64,
        })
    }

    async fn per_agent_analytics(&self, since: DateTime<Utc>) -> RouterResult<Vec<AgentAnalytics>> {
        let state = self.state.read();
        let mut groups: HashMap<AgentId, Vec<&RoutingRecord>> = HashMap::new();
        for record in state
            .routing_records
            .iter()
            .filter(|r| r.created_at >= since)
        {
            groups.entry(record.agent_id).or_default().push(record);
        }

        let mut rows: Vec<AgentAnalytics> = groups
            .into_iter()
            .map(|(agent_id, records)| {
                let routing_times: Vec<f64> = records.iter().map(|r| r.routing_time_ms).collect();
                let exec_times: Vec<f64> =
                    records.iter().filter_map(|r| r.execution_time_ms).collect();
                let successes: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.execution_success.map(|s| if s { 1.0 } else { 0.0 }))
                    .collect();
                let costs: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.cost_actual_cents.map(|c| c as f64))
                    .collect();
                AgentAnalytics {
                    agent_id,
                    routing_count: records.len() as u64,
                    avg_routing_ms: mean(&routing_times),
                    avg_execution_ms: mean(&exec_times),
                    success_rate: mean(&successes),
                    avg_cost_cents: mean(&costs),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.routing_count.cmp(&a.routing_count));
        Ok(rows)
    }

    async fn task_type_analytics(
        &self,
        since: DateTime<Utc>,
    ) -> RouterResult<Vec<TaskTypeAnalytics>> {
        let state = self.state.read();
        let mut groups: HashMap<(String, TaskComplexity), Vec<&RoutingRecord>> = HashMap::new();
        for record in state
            .routing_records
            .iter()
            .filter(|r| r.created_at >= since)
        {
            groups
                .entry((record.task_type.clone(), record.complexity))
                .or_default()
                .push(record);
        }

        let mut rows: Vec<TaskTypeAnalytics> = groups
            .into_iter()
            .map(|((task_type, complexity), records)| {
                let routing_times: Vec<f64> = records.iter().map(|r| r.routing_time_ms).collect();
                let successes: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.execution_success.map(|s| if s { 1.0 } else { 0.0 }))
                    .collect();
                TaskTypeAnalytics {
                    task_type,
                    complexity,
                    count: records.len() as u64,
                    avg_routing_ms: mean(&routing_times),
                    success_rate: mean(&successes),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count));
        Ok(rows)
    }
}

#[async_trait]
impl OutcomeStore for MemoryStore {
    async fn insert_outcome(&self, outcome: &TaskOutcome) -> RouterResult<Uuid> {
        let id = Uuid::new_v4();
        self.state.write().outcomes.push((id, outcome.clone()));
        Ok(id)
    }

    async fn recent_outcomes(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RouterResult<Vec<TaskOutcome>> {
        let state = self.state.read();
        let mut outcomes: Vec<&TaskOutcome> = state
            .outcomes
            .iter()
            .map(|(_, o)| o)
            .filter(|o| o.recorded_at >= since)
            .collect();
        outcomes.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        Ok(outcomes
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn aggregate_performance(
        &self,
        since: DateTime<Utc>,
        min_samples: u32,
    ) -> RouterResult<Vec<PerformanceGroup>> {
        let state = self.state.read();
        let mut groups: HashMap<(AgentId, String, TaskComplexity), Vec<&TaskOutcome>> =
            HashMap::new();
        for (_, outcome) in state.outcomes.iter().filter(|(_, o)| o.recorded_at >= since) {
            groups
                .entry((outcome.agent_id, outcome.task_type.clone(), outcome.complexity))
                .or_default()
                .push(outcome);
        }

        let mut rows: Vec<PerformanceGroup> = groups
            .into_iter()
            .filter(|(_, outcomes)| outcomes.len() as u32 >= min_samples)
            .map(|((agent_id, task_type, complexity), outcomes)| {
                let scores: Vec<f64> = outcomes.iter().map(|o| o.success_score).collect();
                let times: Vec<f64> = outcomes.iter().map(|o| o.completion_seconds).collect();
                let satisfaction: Vec<f64> = outcomes
                    .iter()
                    .map(|o| o.user_satisfaction.unwrap_or(3.0))
                    .collect();
                PerformanceGroup {
                    agent_id,
                    task_type,
                    complexity,
                    sample_size: outcomes.len() as u64,
                    avg_success: mean(&scores).unwrap_or(0.0),
                    std_success: sample_std(&scores),
                    avg_time_seconds: mean(&times).unwrap_or(0.0),
                    avg_satisfaction: mean(&satisfaction).unwrap_or(3.0),
                }
            })
            .collect();
        rows.sort_by(|a, b| {
            b.avg_success
                .partial_cmp(&a.avg_success)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(rows)
    }

    async fn outcome_for_pairing(
        &self,
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RouterResult<Option<(Uuid, f64)>> {
        let state = self.state.read();
        let mut candidates: Vec<&(Uuid, TaskOutcome)> = state
            .outcomes
            .iter()
            .filter(|(_, o)| {
                o.agent_id == agent_id
                    && o.task_type == task_type
                    && o.complexity == complexity
                    && o.recorded_at > after
                    && o.recorded_at <= until
            })
            .collect();
        candidates.sort_by(|a, b| a.1.recorded_at.cmp(&b.1.recorded_at));
        Ok(candidates.first().map(|(id, o)| (*id, o.success_score)))
    }
}

#[async_trait]
impl LearningStore for MemoryStore {
    async fn upsert_specialization(&self, spec: &AgentSpecialization) -> RouterResult<()> {
        let mut state = self.state.write();
        let key = (spec.agent_id, spec.specialization_type.clone());
        match state.specializations.get_mut(&key) {
            Some(existing) => {
                existing.confidence = spec.confidence;
                existing.performance_advantage = spec.performance_advantage;
                existing.sample_size = spec.sample_size;
                existing.last_validated = spec.last_validated;
                existing.is_active = spec.is_active;
            }
            None => {
                state.specializations.insert(key, spec.clone());
            }
        }
        Ok(())
    }

    async fn active_specializations(&self) -> RouterResult<Vec<AgentSpecialization>> {
        let mut specs: Vec<AgentSpecialization> = self
            .state
            .read()
            .specializations
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        specs.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(specs)
    }

    async fn install_optimization(&self, optimization: &RoutingOptimization) -> RouterResult<()> {
        let mut state = self.state.write();
        for prior in &mut state.optimizations {
            prior.is_active = false;
        }
        let mut row = optimization.clone();
        row.is_active = true;
        state.optimizations.push(row);
        Ok(())
    }

    async fn active_optimization(&self) -> RouterResult<Option<RoutingOptimization>> {
        Ok(self
            .state
            .read()
            .optimizations
            .iter()
            .find(|o| o.is_active)
            .cloned())
    }

    async fn optimization_history(&self, limit: u32) -> RouterResult<Vec<RoutingOptimization>> {
        let state = self.state.read();
        let mut rows: Vec<RoutingOptimization> = state.optimizations.clone();
        rows.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn insert_prediction(&self, prediction: &SuccessPrediction) -> RouterResult<()> {
        self.state.write().predictions.push(prediction.clone());
        Ok(())
    }

    async fn unvalidated_predictions(&self, limit: u32) -> RouterResult<Vec<SuccessPrediction>> {
        let state = self.state.read();
        let mut rows: Vec<SuccessPrediction> = state
            .predictions
            .iter()
            .filter(|p| p.validated_at.is_none())
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn mark_prediction_validated(
        &self,
        prediction_id: Uuid,
        accuracy: f64,
        outcome_id: Uuid,
        validated_at: DateTime<Utc>,
    ) -> RouterResult<()> {
        let mut state = self.state.write();
        if let Some(prediction) = state.predictions.iter_mut().find(|p| p.id == prediction_id) {
            prediction.prediction_accuracy = Some(accuracy);
            prediction.validated_at = Some(validated_at);
            let _ = outcome_id;
        }
        Ok(())
    }

    async fn prediction_accuracy(&self, since: DateTime<Utc>) -> RouterResult<Option<f64>> {
        let state = self.state.read();
        let accuracies: Vec<f64> = state
            .predictions
            .iter()
            .filter(|p| p.validated_at.map_or(false, |t| t >= since))
            .filter_map(|p| p.prediction_accuracy)
            .collect();
        Ok(mean(&accuracies))
    }

    async fn insert_learning_metric(
        &self,
        name: &str,
        value: f64,
        metadata: serde_json::Value,
    ) -> RouterResult<()> {
        self.state
            .write()
            .learning_metrics
            .push((name.to_string(), value, metadata, Utc::now()));
        Ok(())
    }
}

#[async_trait]
impl AgentStore for MemoryStore {
    async fn upsert_agent(&self, agent: &Agent) -> RouterResult<()> {
        self.state.write().agents.insert(agent.id, agent.clone());
        Ok(())
    }

    async fn load_agents(&self) -> RouterResult<Vec<Agent>> {
        Ok(self.state.read().agents.values().cloned().collect())
    }

    async fn upsert_breaker(&self, snapshot: &CircuitBreakerSnapshot) -> RouterResult<()> {
        self.state
            .write()
            .breakers
            .insert(snapshot.agent_id, snapshot.clone());
        Ok(())
    }

    async fn load_breakers(&self) -> RouterResult<Vec<CircuitBreakerSnapshot>> {
        Ok(self.state.read().breakers.values().cloned().collect())
    }

    async fn breaker_report(&self) -> RouterResult<Vec<CircuitBreakerSnapshot>> {
        Ok(self
            .state
            .read()
            .breakers
            .values()
            .filter(|b| b.state != router_resilience::CircuitState::Closed || b.failure_count > 0)
            .cloned()
            .collect())
    }
}

//! The learning engine.
//!
//! Owns the in-memory learning state: the outcome ring buffer, the live
//! routing weight matrix, and the specialization map. Readers take
//! snapshot references; all mutation goes through command methods.

use crate::optimizer::{
    current_performance, ensemble_weights, expected_performance,
};
use crate::prediction::{self, PredictionInputs};
use crate::specialization::detect_specializations;
use arc_swap::ArcSwap;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Mutex, RwLock};
use router_core::{
    AgentId, AgentSpecialization, RouterError, RouterResult, RoutingOptimization,
    SuccessPrediction, TaskComplexity, TaskContext, TaskOutcome, WeightMatrix,
};
use router_storage::{LearningStore as _, OutcomeStore as _, Storage};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcomes kept in memory for low-latency learning.
const RING_CAPACITY: usize = 10_000;
/// Aggregation window for full optimization.
const OPTIMIZATION_WINDOW_DAYS: i64 = 30;
/// `run_optimization` is idempotent within this window.
const OPTIMIZATION_IDEMPOTENCY_SECONDS: i64 = 60;
/// Predictions are validated against outcomes arriving within this window.
const VALIDATION_WINDOW_HOURS: i64 = 24;
/// Identifier recorded on optimization snapshots.
const OPTIMIZATION_METHOD: &str = "ensemble_method";

/// Tunable learning parameters.
#[derive(Debug, Clone, Copy)]
pub struct LearningParams {
    /// Incremental weight update rate.
    pub learning_rate: f64,
    /// Exploration probability reserved for weight updates.
    pub exploration_rate: f64,
    /// Confidence gate for surfacing specializations in analytics.
    pub confidence_threshold: f64,
    /// Minimum samples per aggregation group.
    pub minimum_sample_size: u32,
}

impl Default for LearningParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.01,
            exploration_rate: 0.1,
            confidence_threshold: 0.8,
            minimum_sample_size: 20,
        }
    }
}

/// In-memory engine statistics for analytics.
#[derive(Debug, Clone, Serialize)]
pub struct LearningStats {
    /// Outcomes currently in the ring buffer.
    pub outcomes_in_memory: usize,
    /// Active specializations in the map.
    pub active_specializations: usize,
    /// Entries in the live weight matrix.
    pub weight_entries: usize,
    /// Configured learning rate.
    pub learning_rate: f64,
    /// Configured confidence threshold.
    pub confidence_threshold: f64,
    /// Total outcomes processed since startup.
    pub outcomes_processed: u64,
    /// Specializations discovered since startup.
    pub specializations_discovered: u64,
    /// Optimizations applied since startup.
    pub optimizations_applied: u64,
}

/// Learning engine over a durable store.
pub struct LearningEngine {
    params: LearningParams,
    store: Arc<dyn Storage>,
    outcomes: Mutex<VecDeque<TaskOutcome>>,
    weights: ArcSwap<WeightMatrix>,
    specializations: RwLock<HashMap<(AgentId, String), AgentSpecialization>>,
    last_optimization: Mutex<Option<(DateTime<Utc>, RoutingOptimization)>>,
    outcomes_processed: AtomicU64,
    specializations_discovered: AtomicU64,
    optimizations_applied: AtomicU64,
}

impl LearningEngine {
    /// Create an engine with empty state.
    #[must_use]
    pub fn new(params: LearningParams, store: Arc<dyn Storage>) -> Self {
        Self {
            params,
            store,
            outcomes: Mutex::new(VecDeque::with_capacity(1024)),
            weights: ArcSwap::from_pointee(WeightMatrix::new()),
            specializations: RwLock::new(HashMap::new()),
            last_optimization: Mutex::new(None),
            outcomes_processed: AtomicU64::new(0),
            specializations_discovered: AtomicU64::new(0),
            optimizations_applied: AtomicU64::new(0),
        }
    }

    /// Load persisted learning state: the active weight matrix, active
    /// specializations, and the last day of outcomes.
    pub async fn load_state(&self, now: DateTime<Utc>) -> RouterResult<()> {
        if let Some(active) = self.store.active_optimization().await? {
            self.weights.store(Arc::new(active.agent_weights.clone()));
            *self.last_optimization.lock() = Some((active.applied_at, active));
        }

        let specs = self.store.active_specializations().await?;
        {
            let mut map = self.specializations.write();
            for spec in specs {
                map.insert((spec.agent_id, spec.specialization_type.clone()), spec);
            }
        }

        let mut recent = self
            .store
            .recent_outcomes(now - Duration::hours(24), 1000)
            .await?;
        recent.reverse();
        {
            let mut ring = self.outcomes.lock();
            for outcome in recent {
                ring.push_back(outcome);
            }
        }

        info!(
            outcomes = self.outcomes.lock().len(),
            specializations = self.specializations.read().len(),
            "Learning state loaded"
        );
        Ok(())
    }

    /// Ingest one outcome: append to the ring buffer, apply the
    /// incremental weight update, and re-check the agent's
    /// specializations once it has enough history.
    pub async fn ingest(&self, outcome: TaskOutcome, now: DateTime<Utc>) {
        let agent_id = outcome.agent_id;
        let task_key = outcome.task_key();

        let signal = outcome.success_score * (2.0 - outcome.completion_seconds / 30.0);
        self.weights.rcu(|weights| {
            let mut next = (**weights).clone();
            let entry = next
                .entry(agent_id)
                .or_default()
                .entry(task_key.clone())
                .or_insert(0.0);
            *entry = (*entry + self.params.learning_rate * (signal - *entry)).clamp(0.0, 1.0);
            next
        });

        let agent_outcome_count = {
            let mut ring = self.outcomes.lock();
            if ring.len() >= RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(outcome);
            ring.iter().filter(|o| o.agent_id == agent_id).count()
        };

        self.outcomes_processed.fetch_add(1, Ordering::Relaxed);
        debug!(agent_id = %agent_id, task_key = %task_key, signal, "Outcome ingested");

        if agent_outcome_count >= self.params.minimum_sample_size as usize {
            self.refresh_agent_specializations(agent_id, now).await;
        }
    }

    /// Learned weight for a pairing, when one exists.
    #[must_use]
    pub fn weight(&self, agent_id: AgentId, task_key: &str) -> Option<f64> {
        self.weights
            .load()
            .get(&agent_id)
            .and_then(|row| row.get(task_key))
            .copied()
    }

    /// Snapshot reference to the live weight matrix.
    #[must_use]
    pub fn weights_snapshot(&self) -> Arc<WeightMatrix> {
        self.weights.load_full()
    }

    /// Active specializations covering the given pairing.
    #[must_use]
    pub fn specializations_for(
        &self,
        task_type: &str,
        complexity: TaskComplexity,
    ) -> Vec<AgentSpecialization> {
        self.specializations
            .read()
            .values()
            .filter(|s| s.matches(task_type, complexity))
            .cloned()
            .collect()
    }

    /// All active specializations, highest confidence first.
    #[must_use]
    pub fn active_specializations(&self) -> Vec<AgentSpecialization> {
        let mut specs: Vec<AgentSpecialization> = self
            .specializations
            .read()
            .values()
            .filter(|s| s.is_active)
            .cloned()
            .collect();
        specs.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        specs
    }

    /// Specializations confident enough to surface in analytics.
    #[must_use]
    pub fn confident_specializations(&self) -> Vec<AgentSpecialization> {
        self.active_specializations()
            .into_iter()
            .filter(|s| s.confidence >= self.params.confidence_threshold)
            .collect()
    }

    /// Predict the success probability of routing `task` to `agent_id`,
    /// storing the forecast for later calibration.
    pub async fn predict(
        &self,
        task: &TaskContext,
        agent_id: AgentId,
        now: DateTime<Utc>,
    ) -> SuccessPrediction {
        let pairing_outcomes: Vec<TaskOutcome> = {
            let ring = self.outcomes.lock();
            ring.iter()
                .filter(|o| {
                    o.agent_id == agent_id
                        && o.task_type == task.task_type
                        && o.complexity == task.complexity
                })
                .cloned()
                .collect()
        };
        let specializations: Vec<AgentSpecialization> = self
            .specializations
            .read()
            .values()
            .filter(|s| s.agent_id == agent_id)
            .cloned()
            .collect();
        let weight = self.weight(agent_id, &task.task_key());

        let inputs = PredictionInputs {
            pairing_outcomes: &pairing_outcomes,
            specializations: &specializations,
            weight,
        };
        let prediction = prediction::predict(task, agent_id, &inputs, now);

        if let Err(e) = self.store.insert_prediction(&prediction).await {
            warn!(agent_id = %agent_id, error = %e, "Failed to store prediction");
        }

        debug!(
            agent_id = %agent_id,
            task_type = %task.task_type,
            predicted = prediction.predicted_rate,
            model = %prediction.prediction_model,
            "Success probability predicted"
        );
        prediction
    }

    /// Run the full ensemble optimization over 30-day aggregates and
    /// install the resulting matrix. Idempotent per minute; a run that
    /// reproduces the active matrix leaves the active row untouched.
    pub async fn optimize(&self, now: DateTime<Utc>) -> RouterResult<RoutingOptimization> {
        {
            let last = self.last_optimization.lock();
            if let Some((applied_at, ref optimization)) = *last {
                if now - applied_at < Duration::seconds(OPTIMIZATION_IDEMPOTENCY_SECONDS) {
                    debug!("Optimization requested within idempotency window, returning prior");
                    return Ok(optimization.clone());
                }
            }
        }

        let groups = self
            .store
            .aggregate_performance(
                now - Duration::days(OPTIMIZATION_WINDOW_DAYS),
                self.params.minimum_sample_size,
            )
            .await?;
        if groups.is_empty() {
            return Err(RouterError::OptimizationUnderflow {
                samples: 0,
                required: u64::from(self.params.minimum_sample_size),
            });
        }

        let new_weights = ensemble_weights(&groups);
        let sample_size: u64 = groups.iter().map(|g| g.sample_size).sum();

        // No new signal since the prior run: keep the active row.
        if let Some(active) = self.store.active_optimization().await? {
            if active.agent_weights == new_weights {
                info!("Optimization unchanged, retaining active snapshot");
                *self.last_optimization.lock() = Some((now, active.clone()));
                return Ok(active);
            }
        }

        let current = current_performance(&groups);
        let expected = expected_performance(&new_weights, &groups);
        let improvement = if current > 0.0 {
            (expected - current) / current * 100.0
        } else {
            0.0
        };

        let id = Uuid::new_v4();
        let optimization = RoutingOptimization {
            id,
            optimization_version: format!("opt-{}", &id.simple().to_string()[..8]),
            agent_weights: new_weights.clone(),
            performance_improvement: improvement,
            confidence_lower: improvement * 0.7,
            confidence_upper: improvement * 1.3,
            optimization_method: OPTIMIZATION_METHOD.to_string(),
            sample_size,
            applied_at: now,
            validation_period_days: 7,
            is_active: true,
        };

        self.store.install_optimization(&optimization).await?;
        self.weights.store(Arc::new(new_weights));
        self.optimizations_applied.fetch_add(1, Ordering::Relaxed);
        *self.last_optimization.lock() = Some((now, optimization.clone()));

        if let Err(e) = self
            .store
            .insert_learning_metric(
                "optimization_improvement",
                improvement,
                serde_json::json!({
                    "version": optimization.optimization_version,
                    "sample_size": sample_size,
                    "groups": groups.len(),
                }),
            )
            .await
        {
            warn!(error = %e, "Failed to record optimization metric");
        }

        info!(
            version = %optimization.optimization_version,
            improvement,
            sample_size,
            "Routing weights optimized"
        );
        Ok(optimization)
    }

    /// Recompute specializations for every agent with enough in-memory
    /// history. Returns the number of upserts performed.
    ///
    /// # Errors
    /// Propagates a store failure so the caller can apply its retry
    /// interval; the in-memory map is still updated first.
    pub async fn scan_specializations(&self, now: DateTime<Utc>) -> RouterResult<usize> {
        let by_agent: HashMap<AgentId, Vec<TaskOutcome>> = {
            let ring = self.outcomes.lock();
            let mut map: HashMap<AgentId, Vec<TaskOutcome>> = HashMap::new();
            for outcome in ring.iter() {
                map.entry(outcome.agent_id).or_default().push(outcome.clone());
            }
            map
        };

        let mut upserts = 0;
        let mut store_failure = None;
        for (agent_id, outcomes) in by_agent {
            if outcomes.len() < self.params.minimum_sample_size as usize {
                continue;
            }
            match self.apply_detected(agent_id, &outcomes, now).await {
                Ok(count) => upserts += count,
                Err(e) => store_failure = Some(e),
            }
        }
        match store_failure {
            Some(e) => Err(e),
            None => Ok(upserts),
        }
    }

    /// Validate stored predictions against outcomes that arrived within
    /// the validation window. Returns the number validated.
    pub async fn validate_predictions(&self, now: DateTime<Utc>) -> RouterResult<usize> {
        let pending = self.store.unvalidated_predictions(200).await?;
        let mut validated = 0;
        let mut accuracy_sum = 0.0;

        for prediction in pending {
            let window_end = prediction.created_at + Duration::hours(VALIDATION_WINDOW_HOURS);
            if window_end > now {
                // The window is still open; a matching outcome may yet arrive.
                continue;
            }
            let matched = self
                .store
                .outcome_for_pairing(
                    prediction.agent_id,
                    &prediction.task_type,
                    prediction.complexity,
                    prediction.created_at,
                    window_end,
                )
                .await?;
            let Some((outcome_id, actual)) = matched else {
                continue;
            };

            let accuracy = (1.0 - (prediction.predicted_rate - actual).abs()).max(0.0);
            self.store
                .mark_prediction_validated(prediction.id, accuracy, outcome_id, now)
                .await?;
            validated += 1;
            accuracy_sum += accuracy;
        }

        if validated > 0 {
            let mean_accuracy = accuracy_sum / f64::from(validated);
            if let Err(e) = self
                .store
                .insert_learning_metric(
                    "prediction_accuracy",
                    mean_accuracy,
                    serde_json::json!({ "validated": validated }),
                )
                .await
            {
                warn!(error = %e, "Failed to record prediction accuracy metric");
            }
            info!(validated, mean_accuracy, "Prediction validation completed");
        }
        Ok(validated as usize)
    }

    /// Engine statistics for the analytics surface.
    #[must_use]
    pub fn stats(&self) -> LearningStats {
        let weights = self.weights.load();
        LearningStats {
            outcomes_in_memory: self.outcomes.lock().len(),
            active_specializations: self
                .specializations
                .read()
                .values()
                .filter(|s| s.is_active)
                .count(),
            weight_entries: weights.values().map(HashMap::len).sum(),
            learning_rate: self.params.learning_rate,
            confidence_threshold: self.params.confidence_threshold,
            outcomes_processed: self.outcomes_processed.load(Ordering::Relaxed),
            specializations_discovered: self.specializations_discovered.load(Ordering::Relaxed),
            optimizations_applied: self.optimizations_applied.load(Ordering::Relaxed),
        }
    }

    /// Inline re-check on the hot ingest path: store failures degrade to
    /// a warning so outcome recording never aborts.
    async fn refresh_agent_specializations(&self, agent_id: AgentId, now: DateTime<Utc>) {
        let outcomes: Vec<TaskOutcome> = {
            let ring = self.outcomes.lock();
            ring.iter()
                .filter(|o| o.agent_id == agent_id)
                .cloned()
                .collect()
        };
        if let Err(e) = self.apply_detected(agent_id, &outcomes, now).await {
            warn!(agent_id = %agent_id, error = %e, "Specialization persistence deferred");
        }
    }

    async fn apply_detected(
        &self,
        agent_id: AgentId,
        outcomes: &[TaskOutcome],
        now: DateTime<Utc>,
    ) -> RouterResult<usize> {
        let detected = detect_specializations(agent_id, outcomes, now);
        let mut upserts = 0;
        let mut store_failure = None;

        for spec in detected {
            let key = (spec.agent_id, spec.specialization_type.clone());
            let is_new = {
                let mut map = self.specializations.write();
                let is_new = !map.contains_key(&key);
                map.insert(key, spec.clone());
                is_new
            };
            if is_new {
                self.specializations_discovered.fetch_add(1, Ordering::Relaxed);
                info!(
                    agent_id = %agent_id,
                    specialization = %spec.specialization_type,
                    confidence = spec.confidence,
                    advantage = spec.performance_advantage,
                    "New specialization detected"
                );
            }
            if let Err(e) = self.store.upsert_specialization(&spec).await {
                store_failure = Some(e);
            }
            upserts += 1;
        }
        match store_failure {
            Some(e) => Err(e),
            None => Ok(upserts),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_core::RoutingId;
    use router_storage::{LearningStore as _, MemoryStore, OutcomeStore as _};
    use std::collections::BTreeMap;

    fn engine() -> (Arc<MemoryStore>, LearningEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = LearningEngine::new(LearningParams::default(), store.clone());
        (store, engine)
    }

    fn outcome(
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        score: f64,
        completion_seconds: f64,
    ) -> TaskOutcome {
        TaskOutcome {
            routing_id: RoutingId::new(),
            agent_id,
            task_type: task_type.to_string(),
            complexity,
            success_score: score,
            completion_seconds,
            quality_metrics: BTreeMap::new(),
            user_satisfaction: None,
            error_count: 0,
            retry_attempts: 0,
            cost_actual_cents: None,
            context_metadata: serde_json::Value::Null,
            recorded_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_incremental_weight_update() {
        let (_, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();

        // Seed the starting weight through repeated updates is slow, so
        // install it directly via the public ingest path: first verify
        // the update formula from a known starting point of 0.5.
        engine.weights.store(Arc::new({
            let mut m = WeightMatrix::new();
            m.entry(agent)
                .or_default()
                .insert("code_review_complex".to_string(), 0.5);
            m
        }));

        engine
            .ingest(
                outcome(agent, "code_review", TaskComplexity::Complex, 1.0, 10.0),
                now,
            )
            .await;

        // signal = 1.0 * (2 - 10/30) = 1.6667
        // w = 0.5 + 0.01 * (1.6667 - 0.5) = 0.511667
        let weight = engine.weight(agent, "code_review_complex").unwrap();
        assert!((weight - 0.511_666_6).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_weight_clamped_to_unit_interval() {
        let (_, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();

        // A fast failure drives the signal negative; the weight floors at 0.
        engine
            .ingest(outcome(agent, "summarize", TaskComplexity::Moderate, 0.0, 90.0), now)
            .await;
        let weight = engine.weight(agent, "summarize_moderate").unwrap();
        assert!(weight >= 0.0);
    }

    #[tokio::test]
    async fn test_inline_specialization_trigger() {
        let (store, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();

        // 14 mediocre summarize outcomes, then 6 excellent bugfix ones:
        // the 20th ingest crosses the sample floor and detection runs.
        for _ in 0..14 {
            engine
                .ingest(outcome(agent, "summarize", TaskComplexity::Simple, 0.55, 5.0), now)
                .await;
        }
        for _ in 0..6 {
            engine
                .ingest(outcome(agent, "bugfix", TaskComplexity::Complex, 0.95, 5.0), now)
                .await;
        }

        let specs = engine.specializations_for("bugfix", TaskComplexity::Complex);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].specialization_type, "bugfix_complex");
        assert!(specs[0].performance_advantage > 0.15);

        // Persisted as well.
        let stored = store.active_specializations().await.unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test]
    async fn test_optimize_underflow_without_samples() {
        let (_, engine) = engine();
        let err = engine.optimize(Utc::now()).await.unwrap_err();
        assert_eq!(err.kind(), "OptimizationUnderflow");
    }

    #[tokio::test]
    async fn test_optimize_installs_matrix() {
        let (store, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();

        for _ in 0..25 {
            store
                .insert_outcome(&outcome(agent, "summarize", TaskComplexity::Moderate, 0.9, 6.0))
                .await
                .unwrap();
        }

        let optimization = engine.optimize(now).await.unwrap();
        assert_eq!(optimization.optimization_method, "ensemble_method");
        assert_eq!(optimization.sample_size, 25);
        assert!(optimization.optimization_version.starts_with("opt-"));
        assert!(optimization.is_active);

        // The live matrix now reflects the snapshot.
        let weight = engine.weight(agent, "summarize_moderate").unwrap();
        let stored = store.active_optimization().await.unwrap().unwrap();
        assert!((stored.agent_weights[&agent]["summarize_moderate"] - weight).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_optimize_idempotent_within_minute() {
        let (store, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();
        for _ in 0..25 {
            store
                .insert_outcome(&outcome(agent, "summarize", TaskComplexity::Moderate, 0.9, 6.0))
                .await
                .unwrap();
        }

        let first = engine.optimize(now).await.unwrap();
        let second = engine.optimize(now + Duration::seconds(10)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.optimization_history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_optimize_unchanged_data_keeps_active_row() {
        let (store, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();
        for _ in 0..25 {
            store
                .insert_outcome(&outcome(agent, "summarize", TaskComplexity::Moderate, 0.9, 6.0))
                .await
                .unwrap();
        }

        let first = engine.optimize(now).await.unwrap();
        // Past the idempotency window but with no new outcomes: the
        // recomputed matrix matches and the active row is retained.
        let second = engine.optimize(now + Duration::minutes(2)).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.optimization_history(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_predict_stores_prediction() {
        let (store, engine) = engine();
        let agent = AgentId::new();
        let task = TaskContext::builder("summarize", TaskComplexity::Moderate).build();

        let prediction = engine.predict(&task, agent, Utc::now()).await;
        assert!((prediction.predicted_rate - 0.7).abs() < 1e-9);

        let pending = store.unvalidated_predictions(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, prediction.id);
    }

    #[tokio::test]
    async fn test_validate_predictions_fills_accuracy() {
        let (store, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();
        let task = TaskContext::builder("summarize", TaskComplexity::Moderate).build();

        let prediction = engine.predict(&task, agent, now - Duration::hours(30)).await;

        // A matching outcome landed two hours after the prediction.
        let mut matching = outcome(agent, "summarize", TaskComplexity::Moderate, 0.9, 5.0);
        matching.recorded_at = now - Duration::hours(28);
        store.insert_outcome(&matching).await.unwrap();

        let validated = engine.validate_predictions(now).await.unwrap();
        assert_eq!(validated, 1);

        let accuracy = store
            .prediction_accuracy(now - Duration::hours(1))
            .await
            .unwrap()
            .unwrap();
        // accuracy = 1 - |0.7 - 0.9| = 0.8
        assert!((accuracy - 0.8).abs() < 1e-9);
        let _ = prediction;
    }

    #[tokio::test]
    async fn test_ring_buffer_capped() {
        let (_, engine) = engine();
        let agent = AgentId::new();
        let now = Utc::now();

        for _ in 0..RING_CAPACITY + 50 {
            let mut ring = engine.outcomes.lock();
            if ring.len() >= RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(outcome(agent, "x", TaskComplexity::Simple, 0.5, 1.0));
        }
        assert_eq!(engine.outcomes.lock().len(), RING_CAPACITY);
        let _ = now;
    }

    #[tokio::test]
    async fn test_load_state_restores_weights() {
        let (store, _) = engine();
        let agent = AgentId::new();
        let mut weights = WeightMatrix::new();
        weights
            .entry(agent)
            .or_default()
            .insert("summarize_moderate".to_string(), 0.77);
        store
            .install_optimization(&RoutingOptimization {
                id: Uuid::new_v4(),
                optimization_version: "opt-seed".to_string(),
                agent_weights: weights,
                performance_improvement: 2.0,
                confidence_lower: 1.4,
                confidence_upper: 2.6,
                optimization_method: "ensemble_method".to_string(),
                sample_size: 100,
                applied_at: Utc::now(),
                validation_period_days: 7,
                is_active: true,
            })
            .await
            .unwrap();

        let fresh = LearningEngine::new(LearningParams::default(), store.clone());
        fresh.load_state(Utc::now()).await.unwrap();
        assert!((fresh.weight(agent, "summarize_moderate").unwrap() - 0.77).abs() < 1e-12);
    }
}

//! Background control loops.
//!
//! Five cooperative loops run for the lifetime of the service, each with
//! its own cadence and a shorter retry interval on error:
//!
//! | Loop                | Purpose                                         |
//! |---------------------|-------------------------------------------------|
//! | performance refresh | keep the score cache warm for active agents     |
//! | breaker transitions | apply scan-driven breaker state changes         |
//! | snapshots           | record point-in-time performance rows           |
//! | specialization scan | full specialization recomputation               |
//! | prediction checks   | validate stored forecasts against outcomes      |
//!
//! Every loop observes the shared shutdown signal between steps and
//! exits promptly when it fires.

use crate::health::HealthMonitor;
use router_config::ConfigHandle;
use router_core::{TaskComplexity, TaskContext};
use router_learning::LearningEngine;
use router_registry::Registry;
use router_resilience::{BreakerRegistry, LoadTracker};
use router_scoring::Scorer;
use router_storage::{AgentStore as _, MetricsStore as _, PerformanceSnapshotRow, Storage};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Retry interval for the performance refresh loop.
const PERFORMANCE_RETRY: Duration = Duration::from_secs(60);
/// Retry interval for the breaker transition loop.
const BREAKER_RETRY: Duration = Duration::from_secs(30);
/// Retry interval for the snapshot loop.
const SNAPSHOT_RETRY: Duration = Duration::from_secs(300);
/// Retry interval for the specialization loop.
const SPECIALIZATION_RETRY: Duration = Duration::from_secs(300);
/// Retry interval for the prediction validation loop.
const VALIDATION_RETRY: Duration = Duration::from_secs(1800);

/// Owns the background loops.
pub struct ControlLoops {
    config: Arc<ConfigHandle>,
    registry: Arc<Registry>,
    breakers: Arc<BreakerRegistry>,
    load: Arc<LoadTracker>,
    scorer: Arc<Scorer>,
    learning: Arc<LearningEngine>,
    health: Arc<HealthMonitor>,
    store: Arc<dyn Storage>,
}

impl ControlLoops {
    /// Create the loop owner over shared components.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<ConfigHandle>,
        registry: Arc<Registry>,
        breakers: Arc<BreakerRegistry>,
        load: Arc<LoadTracker>,
        scorer: Arc<Scorer>,
        learning: Arc<LearningEngine>,
        health: Arc<HealthMonitor>,
        store: Arc<dyn Storage>,
    ) -> Self {
        Self {
            config,
            registry,
            breakers,
            load,
            scorer,
            learning,
            health,
            store,
        }
    }

    /// Spawn every loop. Each exits when the shutdown signal flips true.
    #[must_use]
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        let handles = vec![
            tokio::spawn(self.clone().performance_refresh_loop(shutdown.clone())),
            tokio::spawn(self.clone().breaker_transition_loop(shutdown.clone())),
            tokio::spawn(self.clone().snapshot_loop(shutdown.clone())),
            tokio::spawn(self.clone().specialization_loop(shutdown.clone())),
            tokio::spawn(self.prediction_validation_loop(shutdown)),
        ];
        info!(loops = handles.len(), "Control loops started");
        handles
    }

    /// Flush unsaved in-memory updates to the durable store. Called on
    /// shutdown after the loops have exited.
    pub async fn flush(&self) {
        for snapshot in self.breakers.snapshots() {
            if let Err(e) = self.store.upsert_breaker(&snapshot).await {
                warn!(agent_id = %snapshot.agent_id, error = %e, "Breaker flush failed");
            }
        }
        info!("Control loop state flushed");
    }

    async fn performance_refresh_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let cadence =
                Duration::from_secs(self.config.get().loops.performance_refresh_seconds);
            let interval = match self.refresh_scores().await {
                Ok(refreshed) => {
                    debug!(refreshed, "Performance cache refreshed");
                    cadence
                }
                Err(e) => {
                    error!(error = %e, "Performance refresh failed");
                    PERFORMANCE_RETRY
                }
            };
            if sleep_or_shutdown(&mut shutdown, interval).await {
                break;
            }
        }
        debug!("Performance refresh loop stopped");
    }

    async fn breaker_transition_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let cadence =
                Duration::from_secs(self.config.get().loops.breaker_transitions_seconds);
            let interval = match self.apply_breaker_transitions().await {
                Ok(changed) => {
                    if changed > 0 {
                        debug!(changed, "Breaker transitions applied");
                    }
                    cadence
                }
                Err(e) => {
                    error!(error = %e, "Breaker transition scan failed");
                    BREAKER_RETRY
                }
            };
            if sleep_or_shutdown(&mut shutdown, interval).await {
                break;
            }
        }
        debug!("Breaker transition loop stopped");
    }

    async fn snapshot_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let cadence = Duration::from_secs(self.config.get().loops.snapshots_seconds);
            let interval = match self.collect_snapshots().await {
                Ok(count) => {
                    debug!(count, "Performance snapshots collected");
                    cadence
                }
                Err(e) => {
                    error!(error = %e, "Snapshot collection failed");
                    SNAPSHOT_RETRY
                }
            };
            if sleep_or_shutdown(&mut shutdown, interval).await {
                break;
            }
        }
        debug!("Snapshot loop stopped");
    }

    async fn specialization_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let cadence = Duration::from_secs(self.config.get().loops.specialization_seconds);
            let interval = match self.learning.scan_specializations(Utc::now()).await {
                Ok(upserts) => {
                    if upserts > 0 {
                        debug!(upserts, "Specialization scan completed");
                    }
                    cadence
                }
                Err(e) => {
                    error!(error = %e, "Specialization scan failed");
                    SPECIALIZATION_RETRY
                }
            };
            if sleep_or_shutdown(&mut shutdown, interval).await {
                break;
            }
        }
        debug!("Specialization loop stopped");
    }

    async fn prediction_validation_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let cadence =
                Duration::from_secs(self.config.get().loops.prediction_validation_seconds);
            let interval = match self.learning.validate_predictions(Utc::now()).await {
                Ok(validated) => {
                    if validated > 0 {
                        debug!(validated, "Predictions validated");
                    }
                    cadence
                }
                Err(e) => {
                    error!(error = %e, "Prediction validation failed");
                    VALIDATION_RETRY
                }
            };
            if sleep_or_shutdown(&mut shutdown, interval).await {
                break;
            }
        }
        debug!("Prediction validation loop stopped");
    }

    async fn refresh_scores(&self) -> router_core::RouterResult<usize> {
        let now = Utc::now();
        let agents = self.registry.active();
        let count = agents.len();
        for agent in agents {
            self.scorer.refresh(agent.id, now).await;
        }
        Ok(count)
    }

    async fn apply_breaker_transitions(&self) -> router_core::RouterResult<usize> {
        let now = Utc::now();
        let changed = self.breakers.apply_transitions(now);
        for agent_id in &changed {
            if let Some(breaker) = self.breakers.get(*agent_id) {
                self.store.upsert_breaker(&breaker.snapshot()).await?;
            }
        }
        Ok(changed.len())
    }

    async fn collect_snapshots(&self) -> router_core::RouterResult<usize> {
        let now = Utc::now();
        let probe = TaskContext::builder("general", TaskComplexity::Moderate).build();
        let mut count = 0;

        for agent in self.registry.active() {
            let score = self.scorer.base_score(agent.id, &probe, now).await;
            let failure_score = self.health.predictive_failure_score(agent.id, now).await;
            let row = PerformanceSnapshotRow {
                agent_id: agent.id,
                snapshot_time: now,
                score,
                active_requests: self.load.count(agent.id),
                load_level: self.load.load_level(agent.id).as_str().to_string(),
                predictive_failure_score: failure_score,
                metadata: serde_json::json!({
                    "capacity": self.load.capacity(),
                }),
            };
            self.store.insert_performance_snapshot(&row).await?;
            count += 1;
        }
        Ok(count)
    }
}

/// Sleep for `duration`, returning early with `true` when the shutdown
/// signal fires (or its sender is gone).
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use router_config::RouterConfig;
    use router_learning::LearningParams;
    use router_registry::Agent;
    use router_resilience::{CircuitBreakerConfig, CircuitState};
    use router_storage::{AgentStore as _, MemoryStore};

    fn loops(config: RouterConfig) -> (Arc<ControlLoops>, Arc<MemoryStore>, Arc<Registry>) {
        let store: Arc<MemoryStore> = Arc::new(MemoryStore::new());
        let registry = Arc::new(Registry::new());
        let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig::default()));
        let load = Arc::new(LoadTracker::new(10));
        let scorer = Arc::new(Scorer::new(store.clone(), load.clone()));
        let learning = Arc::new(LearningEngine::new(LearningParams::default(), store.clone()));
        let health = Arc::new(HealthMonitor::new(
            registry.clone(),
            load.clone(),
            store.clone(),
        ));
        let control = Arc::new(ControlLoops::new(
            Arc::new(ConfigHandle::new(config, None)),
            registry.clone(),
            breakers,
            load,
            scorer,
            learning,
            health,
            store.clone(),
        ));
        (control, store, registry)
    }

    #[tokio::test(start_paused = true)]
    async fn test_loops_exit_on_shutdown() {
        let (control, _, _) = loops(RouterConfig::default());
        let (tx, rx) = watch::channel(false);

        let handles = control.spawn(rx);
        tx.send(true).unwrap();

        for handle in handles {
            tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("loop did not exit on shutdown")
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_refresh_warms_score_cache() {
        let (control, _, registry) = loops(RouterConfig::default());
        registry.register(Agent::new("a1", "anthropic"));
        registry.register(Agent::new("a2", "anthropic"));

        let refreshed = control.refresh_scores().await.unwrap();
        assert_eq!(refreshed, 2);
        assert_eq!(control.scorer.cache_size(), 2);
    }

    #[tokio::test]
    async fn test_breaker_transition_scan_persists_changes() {
        let (control, store, _) = loops(RouterConfig::default());
        let agent = router_core::AgentId::new();
        let now = Utc::now();

        // Drive a breaker into half-open with enough successes to close.
        let breaker = control.breakers.get_or_create(agent);
        for _ in 0..5 {
            breaker.record_failure(now - chrono::Duration::seconds(120));
        }
        assert!(breaker.allow_request(now));
        for _ in 0..3 {
            breaker.record_success();
        }

        let changed = control.apply_breaker_transitions().await.unwrap();
        assert_eq!(changed, 1);
        assert_eq!(breaker.state(), CircuitState::Closed);
        let stored = store.load_breakers().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_snapshot_collection() {
        let (control, store, registry) = loops(RouterConfig::default());
        registry.register(Agent::new("a1", "anthropic"));

        let count = control.collect_snapshots().await.unwrap();
        assert_eq!(count, 1);
        // Stored via the metrics store; verified through the public count
        // of other row kinds staying untouched.
        assert_eq!(store.routing_record_count(), 0);
    }
}

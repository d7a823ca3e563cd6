//! Performance scoring pipeline.
//!
//! Scores are composed from 7-day agent aggregates, 30-day pairing
//! history, live load, and task features. Base scores are cached per
//! agent with a 5 minute TTL and invalidated whenever an outcome lands.
//! Missing history degrades to defaults; a store failure is treated the
//! same way and never aborts the routing path.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use router_core::{AgentId, PerformanceScore, TaskComplexity, TaskContext};
use router_resilience::LoadTracker;
use router_storage::MetricsStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Cache TTL for base scores.
const SCORE_CACHE_TTL_SECONDS: i64 = 300;
/// Aggregate window for agent-level statistics.
const AGENT_STATS_WINDOW_DAYS: i64 = 7;
/// Aggregate window for pairing history.
const PAIRING_HISTORY_WINDOW_DAYS: i64 = 30;
/// Deadline proximity that shifts weight onto latency, in seconds.
const DEADLINE_PRESSURE_SECONDS: f64 = 300.0;

/// Fallback values used when an agent has no recorded history.
#[derive(Debug, Clone, Copy)]
pub struct ScoreDefaults {
    /// Assumed success rate.
    pub success_rate: f64,
    /// Assumed mean execution time in milliseconds.
    pub execution_ms: f64,
    /// Assumed mean cost in cents.
    pub cost_cents: f64,
}

impl Default for ScoreDefaults {
    fn default() -> Self {
        Self {
            success_rate: 0.8,
            execution_ms: 1000.0,
            cost_cents: 10.0,
        }
    }
}

/// Computes multi-dimensional performance scores for candidates.
pub struct Scorer {
    store: Arc<dyn MetricsStore>,
    load: Arc<LoadTracker>,
    defaults: ScoreDefaults,
    cache: DashMap<AgentId, (DateTime<Utc>, PerformanceScore)>,
}

impl Scorer {
    /// Create a scorer over the given history store and load tracker.
    #[must_use]
    pub fn new(store: Arc<dyn MetricsStore>, load: Arc<LoadTracker>) -> Self {
        Self {
            store,
            load,
            defaults: ScoreDefaults::default(),
            cache: DashMap::new(),
        }
    }

    /// Full scoring pipeline: cached base score, load adjustment, then
    /// task adjustments.
    pub async fn score(
        &self,
        agent_id: AgentId,
        task: &TaskContext,
        now: DateTime<Utc>,
    ) -> PerformanceScore {
        let base = self.base_score(agent_id, task, now).await;
        let loaded = self.adjust_for_load(agent_id, base);
        Self::adjust_for_task(loaded, task, now)
    }

    /// Base (pre-load) score for an agent, from cache when fresh.
    pub async fn base_score(
        &self,
        agent_id: AgentId,
        task: &TaskContext,
        now: DateTime<Utc>,
    ) -> PerformanceScore {
        if let Some(entry) = self.cache.get(&agent_id) {
            let (cached_at, score) = *entry;
            if now - cached_at < Duration::seconds(SCORE_CACHE_TTL_SECONDS) {
                return score;
            }
        }

        let score = self.compute_base_score(agent_id, task, now).await;
        self.cache.insert(agent_id, (now, score));
        score
    }

    /// Recompute and cache the base score, bypassing any cached entry.
    /// Used by the periodic refresh loop to keep the cache warm.
    pub async fn refresh(&self, agent_id: AgentId, now: DateTime<Utc>) -> PerformanceScore {
        let task = TaskContext::builder("general", TaskComplexity::Moderate).build();
        let score = self.compute_base_score(agent_id, &task, now).await;
        self.cache.insert(agent_id, (now, score));
        score
    }

    /// Drop the cached score for an agent, forcing recomputation.
    pub fn invalidate(&self, agent_id: AgentId) {
        self.cache.remove(&agent_id);
        debug!(agent_id = %agent_id, "Score cache invalidated");
    }

    /// Number of cached entries.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    async fn compute_base_score(
        &self,
        agent_id: AgentId,
        task: &TaskContext,
        now: DateTime<Utc>,
    ) -> PerformanceScore {
        let stats = match self
            .store
            .agent_stats(agent_id, now - Duration::days(AGENT_STATS_WINDOW_DAYS))
            .await
        {
            Ok(stats) => stats,
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Agent stats unavailable, using defaults");
                router_storage::AgentStats::default()
            }
        };

        let reliability = stats.success_rate.unwrap_or(self.defaults.success_rate);
        let avg_execution_ms = stats.avg_execution_ms.unwrap_or(self.defaults.execution_ms);
        let avg_cost = stats.avg_cost_cents.unwrap_or(self.defaults.cost_cents);

        // 100ms maps to 1.0, 5100ms to 0.0.
        let performance = (1.0 - (avg_execution_ms - 100.0) / 5000.0).clamp(0.0, 1.0);
        let cost_efficiency = (20.0 / avg_cost.max(f64::EPSILON)).clamp(0.1, 1.0);
        let capability_match = 0.8;
        let historical = self.historical_score(agent_id, task, now).await;

        PerformanceScore::from_components(
            reliability,
            performance,
            cost_efficiency,
            capability_match,
            historical,
        )
    }

    async fn historical_score(
        &self,
        agent_id: AgentId,
        task: &TaskContext,
        now: DateTime<Utc>,
    ) -> f64 {
        match self
            .store
            .pairing_stats(
                agent_id,
                &task.task_type,
                task.complexity,
                now - Duration::days(PAIRING_HISTORY_WINDOW_DAYS),
            )
            .await
        {
            Ok(stats) => stats.success_rate.unwrap_or(self.defaults.success_rate),
            Err(e) => {
                warn!(agent_id = %agent_id, error = %e, "Pairing stats unavailable, using default");
                self.defaults.success_rate
            }
        }
    }

    /// Apply the live-load penalty to a base score.
    #[must_use]
    pub fn adjust_for_load(&self, agent_id: AgentId, score: PerformanceScore) -> PerformanceScore {
        let ratio = self.load.ratio(agent_id);
        let penalty = if ratio < 0.3 {
            0.0
        } else if ratio < 0.7 {
            0.1
        } else if ratio < 0.9 {
            0.3
        } else {
            0.7
        };

        PerformanceScore {
            overall: score.overall * (1.0 - penalty),
            load: 1.0 - penalty,
            ..score
        }
        .clamped()
    }

    /// Apply task-feature adjustments to the overall score.
    #[must_use]
    pub fn adjust_for_task(
        score: PerformanceScore,
        task: &TaskContext,
        now: DateTime<Utc>,
    ) -> PerformanceScore {
        let mut overall = score.overall;

        if task.priority >= 8 {
            if score.reliability >= 0.9 {
                overall *= 1.1;
            }
        } else if task.priority <= 3 {
            overall = overall * 0.7 + score.cost_efficiency * 0.3;
        }

        match task.complexity {
            TaskComplexity::Critical => {
                overall = score.reliability * 0.6 + overall * 0.4;
            }
            TaskComplexity::Simple => {
                overall = overall * 0.7 + score.cost_efficiency * 0.3;
            }
            _ => {}
        }

        if let Some(remaining) = task.seconds_until_deadline(now) {
            if remaining < DEADLINE_PRESSURE_SECONDS {
                overall = overall * 0.6 + score.performance * 0.4;
            }
        }

        PerformanceScore {
            overall: overall.clamp(0.0, 1.0),
            ..score
        }
    }
}

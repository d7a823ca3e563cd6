//! Postgres store implementation backed by sqlx.

use crate::stores::{
    AgentAnalytics, AgentStats, AgentStore, LearningStore, MetricsStore, OutcomeStore,
    OverviewStats, PairingStats, PerformanceGroup, PerformanceSnapshotRow, ResolveOutcome,
    TaskTypeAnalytics,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use router_core::{
    AgentId, AgentSpecialization, RouterError, RouterResult, RoutingId, RoutingOptimization,
    RoutingRecord, SuccessPrediction, TaskComplexity, TaskOutcome,
};
use router_registry::{Agent, CapabilityLink};
use router_resilience::{CircuitBreakerSnapshot, CircuitState};
use sqlx::{PgPool, Row};
use uuid::Uuid;

/// Durable store over a Postgres pool.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap a connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn db_err(e: sqlx::Error) -> RouterError {
    RouterError::persistence(e.to_string())
}

fn parse_complexity(value: &str) -> RouterResult<TaskComplexity> {
    TaskComplexity::parse(value)
        .ok_or_else(|| RouterError::internal(format!("unknown complexity in store: {value}")))
}

fn routing_record_from_row(row: &sqlx::postgres::PgRow) -> RouterResult<RoutingRecord> {
    let complexity: String = row.try_get("complexity").map_err(db_err)?;
    Ok(RoutingRecord {
        routing_id: RoutingId::from_uuid(row.try_get("id").map_err(db_err)?),
        agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
        task_type: row.try_get("task_type").map_err(db_err)?,
        complexity: parse_complexity(&complexity)?,
        selection_score: row.try_get("selection_score").map_err(db_err)?,
        routing_time_ms: row.try_get("routing_time_ms").map_err(db_err)?,
        execution_success: row.try_get("execution_success").map_err(db_err)?,
        execution_time_ms: row.try_get("execution_time_ms").map_err(db_err)?,
        cost_actual_cents: row.try_get("cost_actual_cents").map_err(db_err)?,
        task_metadata: row.try_get("metadata_blob").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn outcome_from_row(row: &sqlx::postgres::PgRow) -> RouterResult<TaskOutcome> {
    let complexity: String = row.try_get("complexity").map_err(db_err)?;
    let quality: serde_json::Value = row.try_get("quality_metrics_blob").map_err(db_err)?;
    let quality_metrics = serde_json::from_value(quality).unwrap_or_default();
    Ok(TaskOutcome {
        routing_id: RoutingId::from_uuid(row.try_get("routing_id").map_err(db_err)?),
        agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
        task_type: row.try_get("task_type").map_err(db_err)?,
        complexity: parse_complexity(&complexity)?,
        success_score: row.try_get("success_score").map_err(db_err)?,
        completion_seconds: row.try_get("completion_time_seconds").map_err(db_err)?,
        quality_metrics,
        user_satisfaction: row.try_get("user_satisfaction").map_err(db_err)?,
        error_count: row.try_get::<i32, _>("error_count").map_err(db_err)? as u32,
        retry_attempts: row.try_get::<i32, _>("retry_attempts").map_err(db_err)? as u32,
        cost_actual_cents: row.try_get("cost_actual_cents").map_err(db_err)?,
        context_metadata: row.try_get("context_metadata_blob").map_err(db_err)?,
        recorded_at: row.try_get("created_at").map_err(db_err)?,
    })
}

fn optimization_from_row(row: &sqlx::postgres::PgRow) -> RouterResult<RoutingOptimization> {
    let weights: serde_json::Value = row.try_get("agent_weights_blob").map_err(db_err)?;
    let agent_weights = serde_json::from_value(weights)
        .map_err(|e| RouterError::internal(format!("corrupt weight matrix: {e}")))?;
    Ok(RoutingOptimization {
        id: row.try_get("id").map_err(db_err)?,
        optimization_version: row.try_get("optimization_version").map_err(db_err)?,
        agent_weights,
        performance_improvement: row.try_get("performance_improvement").map_err(db_err)?,
        confidence_lower: row.try_get("confidence_lower").map_err(db_err)?,
        confidence_upper: row.try_get("confidence_upper").map_err(db_err)?,
        optimization_method: row.try_get("optimization_method").map_err(db_err)?,
        sample_size: row.try_get::<i64, _>("sample_size").map_err(db_err)? as u64,
        applied_at: row.try_get("applied_at").map_err(db_err)?,
        validation_period_days: row
            .try_get::<i32, _>("validation_period_days")
            .map_err(db_err)? as u32,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn prediction_from_row(row: &sqlx::postgres::PgRow) -> RouterResult<SuccessPrediction> {
    let complexity: String = row.try_get("complexity").map_err(db_err)?;
    Ok(SuccessPrediction {
        id: row.try_get("id").map_err(db_err)?,
        agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
        task_type: row.try_get("task_type").map_err(db_err)?,
        complexity: parse_complexity(&complexity)?,
        predicted_rate: row.try_get("predicted_success_rate").map_err(db_err)?,
        confidence_lower: row.try_get("confidence_lower").map_err(db_err)?,
        confidence_upper: row.try_get("confidence_upper").map_err(db_err)?,
        risk_factors: row.try_get("risk_factors").map_err(db_err)?,
        prediction_model: row.try_get("prediction_model").map_err(db_err)?,
        prediction_accuracy: row.try_get("prediction_accuracy").map_err(db_err)?,
        created_at: row.try_get("created_at").map_err(db_err)?,
        validated_at: row.try_get("validated_at").map_err(db_err)?,
    })
}

fn specialization_from_row(row: &sqlx::postgres::PgRow) -> RouterResult<AgentSpecialization> {
    let complexities: Vec<String> = row.try_get("complexity_preferences").map_err(db_err)?;
    let complexity_preferences = complexities
        .iter()
        .map(|c| parse_complexity(c))
        .collect::<RouterResult<Vec<_>>>()?;
    Ok(AgentSpecialization {
        agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
        specialization_type: row.try_get("specialization_type").map_err(db_err)?,
        task_types: row.try_get("task_types").map_err(db_err)?,
        complexity_preferences,
        confidence: row.try_get("confidence_score").map_err(db_err)?,
        performance_advantage: row.try_get("performance_advantage").map_err(db_err)?,
        sample_size: row.try_get::<i64, _>("sample_size").map_err(db_err)? as u64,
        discovered_at: row.try_get("discovered_at").map_err(db_err)?,
        last_validated: row.try_get("last_validated").map_err(db_err)?,
        is_active: row.try_get("is_active").map_err(db_err)?,
    })
}

fn breaker_from_row(row: &sqlx::postgres::PgRow) -> RouterResult<CircuitBreakerSnapshot> {
    let state: String = row.try_get("state").map_err(db_err)?;
    Ok(CircuitBreakerSnapshot {
        agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
        state: CircuitState::parse(&state)
            .ok_or_else(|| RouterError::internal(format!("unknown breaker state: {state}")))?,
        failure_count: row.try_get::<i32, _>("failure_count").map_err(db_err)? as u32,
        success_count: row.try_get::<i32, _>("success_count").map_err(db_err)? as u32,
        last_failure_time: row.try_get("last_failure_time").map_err(db_err)?,
        next_retry_time: row.try_get("next_retry_time").map_err(db_err)?,
    })
}

#[async_trait]
impl MetricsStore for PostgresStore {
    async fn insert_routing_record(&self, record: &RoutingRecord) -> RouterResult<()> {
        sqlx::query(
            "INSERT INTO agent_routing_metrics \
             (id, agent_id, task_type, complexity, selection_score, routing_time_ms, metadata_blob, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(record.routing_id.as_uuid())
        .bind(record.agent_id.as_uuid())
        .bind(&record.task_type)
        .bind(record.complexity.as_str())
        .bind(record.selection_score)
        .bind(record.routing_time_ms)
        .bind(&record.task_metadata)
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
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
        let updated = sqlx::query(
            "UPDATE agent_routing_metrics \
             SET execution_success = $3, execution_time_ms = $4, cost_actual_cents = $5, \
                 task_completion_time = $6 \
             WHERE id = $1 AND agent_id = $2 AND execution_success IS NULL AND created_at >= $7",
        )
        .bind(routing_id.as_uuid())
        .bind(agent_id.as_uuid())
        .bind(success)
        .bind(execution_time_ms)
        .bind(cost_actual_cents)
        .bind(execution_time_ms / 1000.0)
        .bind(now - Duration::minutes(1))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if updated.rows_affected() > 0 {
            return Ok(ResolveOutcome::Updated);
        }

        let existing = sqlx::query(
            "SELECT execution_success FROM agent_routing_metrics WHERE id = $1 AND agent_id = $2",
        )
        .bind(routing_id.as_uuid())
        .bind(agent_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match existing {
            Some(row) => {
                let resolved: Option<bool> = row.try_get("execution_success").map_err(db_err)?;
                if resolved.is_some() {
                    Ok(ResolveOutcome::AlreadyResolved)
                } else {
                    Ok(ResolveOutcome::NotFound)
                }
            }
            None => Ok(ResolveOutcome::NotFound),
        }
    }

    async fn get_routing_record(
        &self,
        routing_id: RoutingId,
    ) -> RouterResult<Option<RoutingRecord>> {
        let row = sqlx::query("SELECT * FROM agent_routing_metrics WHERE id = $1")
            .bind(routing_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(routing_record_from_row).transpose()
    }

    async fn agent_stats(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
    ) -> RouterResult<AgentStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_requests, \
                    AVG(CASE WHEN execution_success THEN 1.0 ELSE 0.0 END) AS success_rate, \
                    AVG(execution_time_ms) AS avg_execution_ms, \
                    AVG(cost_actual_cents) AS avg_cost_cents, \
                    PERCENTILE_CONT(0.95) WITHIN GROUP (ORDER BY execution_time_ms) AS p95_execution_ms \
             FROM agent_routing_metrics \
             WHERE agent_id = $1 AND created_at >= $2",
        )
        .bind(agent_id.as_uuid())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(AgentStats {
            total_requests: row.try_get::<i64, _>("total_requests").map_err(db_err)? as u64,
            success_rate: row.try_get("success_rate").map_err(db_err)?,
            avg_execution_ms: row.try_get("avg_execution_ms").map_err(db_err)?,
            avg_cost_cents: row.try_get("avg_cost_cents").map_err(db_err)?,
            p95_execution_ms: row.try_get("p95_execution_ms").map_err(db_err)?,
        })
    }

    async fn pairing_stats(
        &self,
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        since: DateTime<Utc>,
    ) -> RouterResult<PairingStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS sample_size, \
                    AVG(CASE WHEN execution_success THEN 1.0 ELSE 0.0 END) AS success_rate, \
                    AVG(execution_time_ms) AS avg_execution_ms, \
                    AVG(cost_actual_cents) AS avg_cost_cents \
             FROM agent_routing_metrics \
             WHERE agent_id = $1 AND task_type = $2 AND complexity = $3 AND created_at >= $4",
        )
        .bind(agent_id.as_uuid())
        .bind(task_type)
        .bind(complexity.as_str())
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(PairingStats {
            sample_size: row.try_get::<i64, _>("sample_size").map_err(db_err)? as u64,
            success_rate: row.try_get("success_rate").map_err(db_err)?,
            avg_execution_ms: row.try_get("avg_execution_ms").map_err(db_err)?,
            avg_cost_cents: row.try_get("avg_cost_cents").map_err(db_err)?,
        })
    }

    async fn recent_execution_results(
        &self,
        agent_id: AgentId,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RouterResult<Vec<bool>> {
        let rows = sqlx::query(
            "SELECT execution_success FROM agent_routing_metrics \
             WHERE agent_id = $1 AND created_at >= $2 AND execution_success IS NOT NULL \
             ORDER BY created_at DESC LIMIT $3",
        )
        .bind(agent_id.as_uuid())
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| row.try_get("execution_success").map_err(db_err))
            .collect()
    }

    async fn insert_performance_snapshot(&self, row: &PerformanceSnapshotRow) -> RouterResult<()> {
        sqlx::query(
            "INSERT INTO agent_performance_snapshots \
             (agent_id, snapshot_time, overall, reliability, performance, cost, capability_match, \
              load, historical, active_requests, load_level, predictive_failure_score, metadata_blob) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(row.agent_id.as_uuid())
        .bind(row.snapshot_time)
        .bind(row.score.overall)
        .bind(row.score.reliability)
        .bind(row.score.performance)
        .bind(row.score.cost_efficiency)
        .bind(row.score.capability_match)
        .bind(row.score.load)
        .bind(row.score.historical)
        .bind(row.active_requests as i32)
        .bind(&row.load_level)
        .bind(row.predictive_failure_score)
        .bind(&row.metadata)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn routing_overview(&self, since: DateTime<Utc>) -> RouterResult<OverviewStats> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS total_routings, \
                    AVG(routing_time_ms) AS avg_routing_ms, \
                    AVG(CASE WHEN execution_success THEN 1.0 ELSE 0.0 END) AS success_rate, \
                    COUNT(DISTINCT agent_id) AS unique_agents \
             FROM agent_routing_metrics WHERE created_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(OverviewStats {
            total_routings: row.try_get::<i64, _>("total_routings").map_err(db_err)? as u64,
            avg_routing_ms: row.try_get("avg_routing_ms").map_err(db_err)?,
            success_rate: row.try_get("success_rate").map_err(db_err)?,
            unique_agents: row.try_get::<i64, _>("unique_agents").map_err(db_err)? as u64,
        })
    }

    async fn per_agent_analytics(&self, since: DateTime<Utc>) -> RouterResult<Vec<AgentAnalytics>> {
        let rows = sqlx::query(
            "SELECT agent_id, COUNT(*) AS routing_count, \
                    AVG(routing_time_ms) AS avg_routing_ms, \
                    AVG(execution_time_ms) AS avg_execution_ms, \
                    AVG(CASE WHEN execution_success THEN 1.0 ELSE 0.0 END) AS success_rate, \
                    AVG(cost_actual_cents) AS avg_cost_cents \
             FROM agent_routing_metrics WHERE created_at >= $1 \
             GROUP BY agent_id ORDER BY routing_count DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                Ok(AgentAnalytics {
                    agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
                    routing_count: row.try_get::<i64, _>("routing_count").map_err(db_err)? as u64,
                    avg_routing_ms: row.try_get("avg_routing_ms").map_err(db_err)?,
                    avg_execution_ms: row.try_get("avg_execution_ms").map_err(db_err)?,
                    success_rate: row.try_get("success_rate").map_err(db_err)?,
                    avg_cost_cents: row.try_get("avg_cost_cents").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn task_type_analytics(
        &self,
        since: DateTime<Utc>,
    ) -> RouterResult<Vec<TaskTypeAnalytics>> {
        let rows = sqlx::query(
            "SELECT task_type, complexity, COUNT(*) AS count, \
                    AVG(routing_time_ms) AS avg_routing_ms, \
                    AVG(CASE WHEN execution_success THEN 1.0 ELSE 0.0 END) AS success_rate \
             FROM agent_routing_metrics WHERE created_at >= $1 \
             GROUP BY task_type, complexity ORDER BY count DESC",
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let complexity: String = row.try_get("complexity").map_err(db_err)?;
                Ok(TaskTypeAnalytics {
                    task_type: row.try_get("task_type").map_err(db_err)?,
                    complexity: parse_complexity(&complexity)?,
                    count: row.try_get::<i64, _>("count").map_err(db_err)? as u64,
                    avg_routing_ms: row.try_get("avg_routing_ms").map_err(db_err)?,
                    success_rate: row.try_get("success_rate").map_err(db_err)?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl OutcomeStore for PostgresStore {
    async fn insert_outcome(&self, outcome: &TaskOutcome) -> RouterResult<Uuid> {
        let id = Uuid::new_v4();
        let quality = serde_json::to_value(&outcome.quality_metrics)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));
        sqlx::query(
            "INSERT INTO agent_task_outcomes \
             (id, routing_id, agent_id, task_type, complexity, success_score, \
              completion_time_seconds, quality_metrics_blob, user_satisfaction, error_count, \
              retry_attempts, cost_actual_cents, context_metadata_blob, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
        )
        .bind(id)
        .bind(outcome.routing_id.as_uuid())
        .bind(outcome.agent_id.as_uuid())
        .bind(&outcome.task_type)
        .bind(outcome.complexity.as_str())
        .bind(outcome.success_score)
        .bind(outcome.completion_seconds)
        .bind(quality)
        .bind(outcome.user_satisfaction)
        .bind(outcome.error_count as i32)
        .bind(outcome.retry_attempts as i32)
        .bind(outcome.cost_actual_cents)
        .bind(&outcome.context_metadata)
        .bind(outcome.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(id)
    }

    async fn recent_outcomes(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> RouterResult<Vec<TaskOutcome>> {
        let rows = sqlx::query(
            "SELECT * FROM agent_task_outcomes WHERE created_at >= $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(since)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(outcome_from_row).collect()
    }

    async fn aggregate_performance(
        &self,
        since: DateTime<Utc>,
        min_samples: u32,
    ) -> RouterResult<Vec<PerformanceGroup>> {
        let rows = sqlx::query(
            "SELECT agent_id, task_type, complexity, COUNT(*) AS sample_size, \
                    AVG(success_score) AS avg_success, \
                    STDDEV(success_score) AS std_success, \
                    AVG(completion_time_seconds) AS avg_time, \
                    AVG(COALESCE(user_satisfaction, 3.0)) AS avg_satisfaction \
             FROM agent_task_outcomes WHERE created_at >= $1 \
             GROUP BY agent_id, task_type, complexity \
             HAVING COUNT(*) >= $2 \
             ORDER BY avg_success DESC",
        )
        .bind(since)
        .bind(i64::from(min_samples))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let complexity: String = row.try_get("complexity").map_err(db_err)?;
                Ok(PerformanceGroup {
                    agent_id: AgentId::from_uuid(row.try_get("agent_id").map_err(db_err)?),
                    task_type: row.try_get("task_type").map_err(db_err)?,
                    complexity: parse_complexity(&complexity)?,
                    sample_size: row.try_get::<i64, _>("sample_size").map_err(db_err)? as u64,
                    avg_success: row.try_get("avg_success").map_err(db_err)?,
                    std_success: row
                        .try_get::<Option<f64>, _>("std_success")
                        .map_err(db_err)?
                        .unwrap_or(0.0),
                    avg_time_seconds: row.try_get("avg_time").map_err(db_err)?,
                    avg_satisfaction: row.try_get("avg_satisfaction").map_err(db_err)?,
                })
            })
            .collect()
    }

    async fn outcome_for_pairing(
        &self,
        agent_id: AgentId,
        task_type: &str,
        complexity: TaskComplexity,
        after: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> RouterResult<Option<(Uuid, f64)>> {
        let row = sqlx::query(
            "SELECT id, success_score FROM agent_task_outcomes \
             WHERE agent_id = $1 AND task_type = $2 AND complexity = $3 \
               AND created_at > $4 AND created_at <= $5 \
             ORDER BY created_at ASC LIMIT 1",
        )
        .bind(agent_id.as_uuid())
        .bind(task_type)
        .bind(complexity.as_str())
        .bind(after)
        .bind(until)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| {
            Ok((
                row.try_get("id").map_err(db_err)?,
                row.try_get("success_score").map_err(db_err)?,
            ))
        })
        .transpose()
    }
}

#[async_trait]
impl LearningStore for PostgresStore {
    async fn upsert_specialization(&self, spec: &AgentSpecialization) -> RouterResult<()> {
        let complexities: Vec<String> = spec
            .complexity_preferences
            .iter()
            .map(|c| c.as_str().to_string())
            .collect();
        sqlx::query(
            "INSERT INTO agent_specializations \
             (agent_id, specialization_type, task_types, complexity_preferences, \
              confidence_score, performance_advantage, sample_size, discovered_at, \
              last_validated, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (agent_id, specialization_type) DO UPDATE SET \
                confidence_score = EXCLUDED.confidence_score, \
                performance_advantage = EXCLUDED.performance_advantage, \
                sample_size = EXCLUDED.sample_size, \
                last_validated = EXCLUDED.last_validated, \
                is_active = EXCLUDED.is_active",
        )
        .bind(spec.agent_id.as_uuid())
        .bind(&spec.specialization_type)
        .bind(&spec.task_types)
        .bind(&complexities)
        .bind(spec.confidence)
        .bind(spec.performance_advantage)
        .bind(spec.sample_size as i64)
        .bind(spec.discovered_at)
        .bind(spec.last_validated)
        .bind(spec.is_active)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn active_specializations(&self) -> RouterResult<Vec<AgentSpecialization>> {
        let rows = sqlx::query(
            "SELECT * FROM agent_specializations WHERE is_active = TRUE \
             ORDER BY confidence_score DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(specialization_from_row).collect()
    }

    async fn install_optimization(&self, optimization: &RoutingOptimization) -> RouterResult<()> {
        let weights = serde_json::to_value(&optimization.agent_weights)
            .map_err(|e| RouterError::internal(format!("unserializable weight matrix: {e}")))?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query("UPDATE routing_optimizations SET is_active = FALSE WHERE is_active = TRUE")
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;
        sqlx::query(
            "INSERT INTO routing_optimizations \
             (id, optimization_version, agent_weights_blob, performance_improvement, \
              confidence_lower, confidence_upper, optimization_method, sample_size, \
              applied_at, validation_period_days, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, TRUE)",
        )
        .bind(optimization.id)
        .bind(&optimization.optimization_version)
        .bind(weights)
        .bind(optimization.performance_improvement)
        .bind(optimization.confidence_lower)
        .bind(optimization.confidence_upper)
        .bind(&optimization.optimization_method)
        .bind(optimization.sample_size as i64)
        .bind(optimization.applied_at)
        .bind(optimization.validation_period_days as i32)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;
        Ok(())
    }

    async fn active_optimization(&self) -> RouterResult<Option<RoutingOptimization>> {
        let row = sqlx::query(
            "SELECT * FROM routing_optimizations WHERE is_active = TRUE \
             ORDER BY applied_at DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(optimization_from_row).transpose()
    }

    async fn optimization_history(&self, limit: u32) -> RouterResult<Vec<RoutingOptimization>> {
        let rows = sqlx::query(
            "SELECT * FROM routing_optimizations ORDER BY applied_at DESC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(optimization_from_row).collect()
    }

    async fn insert_prediction(&self, prediction: &SuccessPrediction) -> RouterResult<()> {
        sqlx::query(
            "INSERT INTO success_predictions \
             (id, agent_id, task_type, complexity, predicted_success_rate, confidence_lower, \
              confidence_upper, risk_factors, prediction_model, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(prediction.id)
        .bind(prediction.agent_id.as_uuid())
        .bind(&prediction.task_type)
        .bind(prediction.complexity.as_str())
        .bind(prediction.predicted_rate)
        .bind(prediction.confidence_lower)
        .bind(prediction.confidence_upper)
        .bind(&prediction.risk_factors)
        .bind(&prediction.prediction_model)
        .bind(prediction.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn unvalidated_predictions(&self, limit: u32) -> RouterResult<Vec<SuccessPrediction>> {
        let rows = sqlx::query(
            "SELECT * FROM success_predictions WHERE validated_at IS NULL \
             ORDER BY created_at ASC LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(prediction_from_row).collect()
    }

    async fn mark_prediction_validated(
        &self,
        prediction_id: Uuid,
        accuracy: f64,
        outcome_id: Uuid,
        validated_at: DateTime<Utc>,
    ) -> RouterResult<()> {
        sqlx::query(
            "UPDATE success_predictions \
             SET prediction_accuracy = $2, actual_outcome_id = $3, validated_at = $4 \
             WHERE id = $1",
        )
        .bind(prediction_id)
        .bind(accuracy)
        .bind(outcome_id)
        .bind(validated_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn prediction_accuracy(&self, since: DateTime<Utc>) -> RouterResult<Option<f64>> {
        let row = sqlx::query(
            "SELECT AVG(prediction_accuracy) AS avg_accuracy FROM success_predictions \
             WHERE validated_at >= $1",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        row.try_get("avg_accuracy").map_err(db_err)
    }

    async fn insert_learning_metric(
        &self,
        name: &str,
        value: f64,
        metadata: serde_json::Value,
    ) -> RouterResult<()> {
        sqlx::query(
            "INSERT INTO learning_metrics (metric_name, metric_value, metric_metadata_blob) \
             VALUES ($1, $2, $3)",
        )
        .bind(name)
        .bind(value)
        .bind(metadata)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}

#[async_trait]
impl AgentStore for PostgresStore {
    async fn upsert_agent(&self, agent: &Agent) -> RouterResult<()> {
        let capabilities = serde_json::to_value(&agent.capabilities)
            .unwrap_or(serde_json::Value::Array(Vec::new()));
        sqlx::query(
            "INSERT INTO agents (id, name, status, provider, capabilities_blob, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (id) DO UPDATE SET \
                name = EXCLUDED.name, status = EXCLUDED.status, provider = EXCLUDED.provider, \
                capabilities_blob = EXCLUDED.capabilities_blob",
        )
        .bind(agent.id.as_uuid())
        .bind(&agent.name)
        .bind(agent.status.as_str())
        .bind(&agent.provider)
        .bind(capabilities)
        .bind(agent.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_agents(&self) -> RouterResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        rows.iter()
            .map(|row| {
                let status: String = row.try_get("status").map_err(db_err)?;
                let capabilities: serde_json::Value =
                    row.try_get("capabilities_blob").map_err(db_err)?;
                let capabilities: Vec<CapabilityLink> =
                    serde_json::from_value(capabilities).unwrap_or_default();
                Ok(Agent {
                    id: AgentId::from_uuid(row.try_get("id").map_err(db_err)?),
                    name: row.try_get("name").map_err(db_err)?,
                    status: router_core::AgentStatus::parse(&status).ok_or_else(|| {
                        RouterError::internal(format!("unknown agent status: {status}"))
                    })?,
                    provider: row.try_get("provider").map_err(db_err)?,
                    created_at: row.try_get("created_at").map_err(db_err)?,
                    capabilities,
                })
            })
            .collect()
    }

    async fn upsert_breaker(&self, snapshot: &CircuitBreakerSnapshot) -> RouterResult<()> {
        sqlx::query(
            "INSERT INTO agent_circuit_breakers \
             (agent_id, state, failure_count, success_count, last_failure_time, next_retry_time, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, NOW()) \
             ON CONFLICT (agent_id) DO UPDATE SET \
                state = EXCLUDED.state, \
                failure_count = EXCLUDED.failure_count, \
                success_count = EXCLUDED.success_count, \
                last_failure_time = EXCLUDED.last_failure_time, \
                next_retry_time = EXCLUDED.next_retry_time, \
                updated_at = NOW()",
        )
        .bind(snapshot.agent_id.as_uuid())
        .bind(snapshot.state.as_str())
        .bind(snapshot.failure_count as i32)
        .bind(snapshot.success_count as i32)
        .bind(snapshot.last_failure_time)
        .bind(snapshot.next_retry_time)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_breakers(&self) -> RouterResult<Vec<CircuitBreakerSnapshot>> {
        let rows = sqlx::query("SELECT * FROM agent_circuit_breakers")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter().map(breaker_from_row).collect()
    }

    async fn breaker_report(&self) -> RouterResult<Vec<CircuitBreakerSnapshot>> {
        let rows = sqlx::query(
            "SELECT * FROM agent_circuit_breakers WHERE state != 'CLOSED' OR failure_count > 0",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(breaker_from_row).collect()
    }
}

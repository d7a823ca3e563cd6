//! Database schema migrations.
//!
//! All the SQL migrations for the router database, in order.

use crate::migration::Migration;

/// Get all migrations in order.
#[must_use]
pub fn all_migrations() -> Vec<Migration> {
    vec![
        v001_create_agents(),
        v002_create_routing_metrics(),
        v003_create_circuit_breakers(),
        v004_create_performance_snapshots(),
        v005_create_task_outcomes(),
        v006_create_specializations(),
        v007_create_routing_optimizations(),
        v008_create_success_predictions(),
        v009_create_learning_metrics(),
    ]
}

/// V001: Agents and capabilities.
#[must_use]
pub fn v001_create_agents() -> Migration {
    Migration::builder(20240601000001, "create_agents")
        .up(r#"
            CREATE TABLE IF NOT EXISTS agents (
                id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                status VARCHAR(20) NOT NULL DEFAULT 'active',
                provider VARCHAR(100) NOT NULL DEFAULT '',
                capabilities_blob JSONB NOT NULL DEFAULT '[]',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE TABLE IF NOT EXISTS capabilities (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                name VARCHAR(100) NOT NULL UNIQUE,
                category VARCHAR(100) NOT NULL DEFAULT 'general',
                parameters_blob JSONB
            );

            CREATE TABLE IF NOT EXISTS agent_capabilities (
                agent_id UUID NOT NULL REFERENCES agents(id) ON DELETE CASCADE,
                capability_id UUID NOT NULL REFERENCES capabilities(id) ON DELETE CASCADE,
                priority INTEGER NOT NULL DEFAULT 5,
                PRIMARY KEY (agent_id, capability_id)
            );

            CREATE INDEX IF NOT EXISTS idx_agents_status ON agents(status);
            CREATE INDEX IF NOT EXISTS idx_agent_capabilities_agent ON agent_capabilities(agent_id);
        "#)
        .down(r#"
            DROP TABLE IF EXISTS agent_capabilities;
            DROP TABLE IF EXISTS capabilities;
            DROP TABLE IF EXISTS agents;
        "#)
        .tag("core")
        .build()
}

/// V002: Routing decision records.
#[must_use]
pub fn v002_create_routing_metrics() -> Migration {
    Migration::builder(20240601000002, "create_routing_metrics")
        .up(r#"
            CREATE TABLE IF NOT EXISTS agent_routing_metrics (
                id UUID PRIMARY KEY,
                agent_id UUID NOT NULL,
                task_type VARCHAR(100) NOT NULL,
                complexity VARCHAR(20) NOT NULL,
                selection_score DOUBLE PRECISION NOT NULL,
                routing_time_ms DOUBLE PRECISION NOT NULL,
                execution_success BOOLEAN,
                execution_time_ms DOUBLE PRECISION,
                cost_actual_cents BIGINT,
                task_completion_time DOUBLE PRECISION,
                metadata_blob JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_routing_metrics_agent_id ON agent_routing_metrics(agent_id);
            CREATE INDEX IF NOT EXISTS idx_routing_metrics_task_type ON agent_routing_metrics(task_type);
            CREATE INDEX IF NOT EXISTS idx_routing_metrics_created_at ON agent_routing_metrics(created_at);
            CREATE INDEX IF NOT EXISTS idx_routing_metrics_pairing
                ON agent_routing_metrics(agent_id, task_type, complexity, created_at);
        "#)
        .down("DROP TABLE IF EXISTS agent_routing_metrics;")
        .tag("routing")
        .build()
}

/// V003: Circuit breaker state rows.
#[must_use]
pub fn v003_create_circuit_breakers() -> Migration {
    Migration::builder(20240601000003, "create_circuit_breakers")
        .up(r#"
            CREATE TABLE IF NOT EXISTS agent_circuit_breakers (
                agent_id UUID PRIMARY KEY,
                state VARCHAR(20) NOT NULL DEFAULT 'CLOSED',
                failure_count INTEGER NOT NULL DEFAULT 0,
                success_count INTEGER NOT NULL DEFAULT 0,
                last_failure_time TIMESTAMPTZ,
                next_retry_time TIMESTAMPTZ,
                failure_threshold INTEGER NOT NULL DEFAULT 5,
                recovery_timeout_ms BIGINT NOT NULL DEFAULT 60000,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_circuit_breakers_state ON agent_circuit_breakers(state);
        "#)
        .down("DROP TABLE IF EXISTS agent_circuit_breakers;")
        .tag("resilience")
        .build()
}

/// V004: Point-in-time performance snapshots.
#[must_use]
pub fn v004_create_performance_snapshots() -> Migration {
    Migration::builder(20240601000004, "create_performance_snapshots")
        .up(r#"
            CREATE TABLE IF NOT EXISTS agent_performance_snapshots (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                agent_id UUID NOT NULL,
                snapshot_time TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                overall DOUBLE PRECISION NOT NULL,
                reliability DOUBLE PRECISION NOT NULL,
                performance DOUBLE PRECISION NOT NULL,
                cost DOUBLE PRECISION NOT NULL,
                capability_match DOUBLE PRECISION NOT NULL,
                load DOUBLE PRECISION NOT NULL,
                historical DOUBLE PRECISION NOT NULL,
                active_requests INTEGER NOT NULL DEFAULT 0,
                load_level VARCHAR(20),
                predictive_failure_score DOUBLE PRECISION NOT NULL DEFAULT 0.0,
                metadata_blob JSONB NOT NULL DEFAULT '{}'
            );

            CREATE INDEX IF NOT EXISTS idx_performance_snapshots_agent ON agent_performance_snapshots(agent_id);
            CREATE INDEX IF NOT EXISTS idx_performance_snapshots_time ON agent_performance_snapshots(snapshot_time);
        "#)
        .down("DROP TABLE IF EXISTS agent_performance_snapshots;")
        .tag("routing")
        .build()
}

/// V005: Task outcomes.
#[must_use]
pub fn v005_create_task_outcomes() -> Migration {
    Migration::builder(20240601000005, "create_task_outcomes")
        .up(r#"
            CREATE TABLE IF NOT EXISTS agent_task_outcomes (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                routing_id UUID NOT NULL,
                agent_id UUID NOT NULL,
                task_type VARCHAR(100) NOT NULL,
                complexity VARCHAR(20) NOT NULL,
                success_score DOUBLE PRECISION NOT NULL
                    CHECK (success_score >= 0.0 AND success_score <= 1.0),
                completion_time_seconds DOUBLE PRECISION NOT NULL,
                quality_metrics_blob JSONB NOT NULL DEFAULT '{}',
                user_satisfaction DOUBLE PRECISION
                    CHECK (user_satisfaction >= 0.0 AND user_satisfaction <= 5.0),
                error_count INTEGER NOT NULL DEFAULT 0,
                retry_attempts INTEGER NOT NULL DEFAULT 0,
                cost_actual_cents BIGINT,
                context_metadata_blob JSONB NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_task_outcomes_agent ON agent_task_outcomes(agent_id);
            CREATE INDEX IF NOT EXISTS idx_task_outcomes_routing ON agent_task_outcomes(routing_id);
            CREATE INDEX IF NOT EXISTS idx_task_outcomes_pairing
                ON agent_task_outcomes(agent_id, task_type, complexity, created_at);
            CREATE INDEX IF NOT EXISTS idx_task_outcomes_created_at ON agent_task_outcomes(created_at);
        "#)
        .down("DROP TABLE IF EXISTS agent_task_outcomes;")
        .tag("learning")
        .build()
}

/// V006: Discovered specializations.
#[must_use]
pub fn v006_create_specializations() -> Migration {
    Migration::builder(20240601000006, "create_specializations")
        .up(r#"
            CREATE TABLE IF NOT EXISTS agent_specializations (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                agent_id UUID NOT NULL,
                specialization_type VARCHAR(100) NOT NULL,
                task_types TEXT[] NOT NULL,
                complexity_preferences TEXT[] NOT NULL,
                confidence_score DOUBLE PRECISION NOT NULL
                    CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
                performance_advantage DOUBLE PRECISION NOT NULL,
                sample_size BIGINT NOT NULL,
                discovered_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                last_validated TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                UNIQUE (agent_id, specialization_type)
            );

            CREATE INDEX IF NOT EXISTS idx_specializations_agent ON agent_specializations(agent_id);
            CREATE INDEX IF NOT EXISTS idx_specializations_active ON agent_specializations(is_active);
        "#)
        .down("DROP TABLE IF EXISTS agent_specializations;")
        .tag("learning")
        .build()
}

/// V007: Weight matrix snapshots.
#[must_use]
pub fn v007_create_routing_optimizations() -> Migration {
    Migration::builder(20240601000007, "create_routing_optimizations")
        .up(r#"
            CREATE TABLE IF NOT EXISTS routing_optimizations (
                id UUID PRIMARY KEY,
                optimization_version VARCHAR(50) NOT NULL,
                agent_weights_blob JSONB NOT NULL,
                performance_improvement DOUBLE PRECISION NOT NULL,
                confidence_lower DOUBLE PRECISION NOT NULL,
                confidence_upper DOUBLE PRECISION NOT NULL,
                optimization_method VARCHAR(50) NOT NULL,
                sample_size BIGINT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                validation_period_days INTEGER NOT NULL DEFAULT 7,
                is_active BOOLEAN NOT NULL DEFAULT TRUE
            );

            CREATE INDEX IF NOT EXISTS idx_routing_optimizations_active ON routing_optimizations(is_active);
            CREATE INDEX IF NOT EXISTS idx_routing_optimizations_applied ON routing_optimizations(applied_at);
        "#)
        .down("DROP TABLE IF EXISTS routing_optimizations;")
        .tag("learning")
        .build()
}

/// V008: Stored success predictions.
#[must_use]
pub fn v008_create_success_predictions() -> Migration {
    Migration::builder(20240601000008, "create_success_predictions")
        .up(r#"
            CREATE TABLE IF NOT EXISTS success_predictions (
                id UUID PRIMARY KEY,
                agent_id UUID NOT NULL,
                task_type VARCHAR(100) NOT NULL,
                complexity VARCHAR(20) NOT NULL,
                predicted_success_rate DOUBLE PRECISION NOT NULL
                    CHECK (predicted_success_rate >= 0.0 AND predicted_success_rate <= 1.0),
                confidence_lower DOUBLE PRECISION NOT NULL,
                confidence_upper DOUBLE PRECISION NOT NULL,
                risk_factors TEXT[] NOT NULL DEFAULT '{}',
                prediction_model VARCHAR(50) NOT NULL,
                prediction_accuracy DOUBLE PRECISION,
                actual_outcome_id UUID,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                validated_at TIMESTAMPTZ
            );

            CREATE INDEX IF NOT EXISTS idx_success_predictions_pairing
                ON success_predictions(agent_id, task_type, complexity);
            CREATE INDEX IF NOT EXISTS idx_success_predictions_unvalidated
                ON success_predictions(created_at) WHERE validated_at IS NULL;
        "#)
        .down("DROP TABLE IF EXISTS success_predictions;")
        .tag("learning")
        .build()
}

/// V009: Learning metric observations.
#[must_use]
pub fn v009_create_learning_metrics() -> Migration {
    Migration::builder(20240601000009, "create_learning_metrics")
        .up(r#"
            CREATE TABLE IF NOT EXISTS learning_metrics (
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                metric_name VARCHAR(100) NOT NULL,
                metric_value DOUBLE PRECISION NOT NULL,
                metric_metadata_blob JSONB NOT NULL DEFAULT '{}',
                measurement_timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );

            CREATE INDEX IF NOT EXISTS idx_learning_metrics_name_time
                ON learning_metrics(metric_name, measurement_timestamp);
        "#)
        .down("DROP TABLE IF EXISTS learning_metrics;")
        .tag("learning")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_ordered_and_unique() {
        let migrations = all_migrations();
        assert_eq!(migrations.len(), 9);

        let mut versions: Vec<i64> = migrations.iter().map(|m| m.version).collect();
        let sorted = {
            let mut v = versions.clone();
            v.sort_unstable();
            v
        };
        assert_eq!(versions, sorted);
        versions.dedup();
        assert_eq!(versions.len(), 9);
    }

    #[test]
    fn test_all_migrations_have_down() {
        for migration in all_migrations() {
            assert!(migration.down_sql.is_some(), "{migration} lacks down SQL");
            assert!(migration.verify_checksum());
        }
    }
}

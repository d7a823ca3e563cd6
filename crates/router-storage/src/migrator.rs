//! Migration runner.

use crate::migration::Migration;
use sqlx::{PgPool, Row};
use std::time::Instant;
use tracing::{info, warn};

/// Migration errors.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// A database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    /// An applied migration's checksum no longer matches.
    #[error("checksum mismatch for V{version}: the applied SQL differs from the source")]
    ChecksumMismatch {
        /// Version with the mismatch.
        version: i64,
    },
}

/// Applies pending migrations against a Postgres pool, tracking applied
/// versions and checksums in `_router_migrations`.
pub struct Migrator {
    pool: PgPool,
}

impl Migrator {
    /// Create a migrator over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every pending migration, in order.
    ///
    /// Returns the number of migrations applied.
    pub async fn run(&self, migrations: &[Migration]) -> Result<usize, MigrationError> {
        self.ensure_tracking_table().await?;

        let applied = self.applied_versions().await?;
        let mut count = 0;

        for migration in migrations {
            if let Some(checksum) = applied.iter().find_map(|(v, c)| {
                (*v == migration.version).then(|| c.clone())
            }) {
                if checksum != migration.checksum {
                    return Err(MigrationError::ChecksumMismatch {
                        version: migration.version,
                    });
                }
                continue;
            }

            let start = Instant::now();
            let mut tx = self.pool.begin().await?;
            sqlx::raw_sql(&migration.up_sql).execute(&mut *tx).await?;
            sqlx::query(
                "INSERT INTO _router_migrations (version, name, checksum, execution_time_ms) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(migration.version)
            .bind(&migration.name)
            .bind(&migration.checksum)
            .bind(start.elapsed().as_millis() as i64)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;

            info!(
                version = migration.version,
                name = %migration.name,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Migration applied"
            );
            count += 1;
        }

        if count == 0 {
            info!("No pending migrations");
        }
        Ok(count)
    }

    /// Roll back the most recently applied migration, when it supports
    /// rollback.
    pub async fn rollback_last(&self, migrations: &[Migration]) -> Result<bool, MigrationError> {
        self.ensure_tracking_table().await?;

        let row = sqlx::query(
            "SELECT version FROM _router_migrations ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(false);
        };
        let version: i64 = row.get("version");

        let Some(migration) = migrations.iter().find(|m| m.version == version) else {
            warn!(version, "Applied migration not found in source set");
            return Ok(false);
        };
        let Some(ref down_sql) = migration.down_sql else {
            warn!(version, "Migration does not support rollback");
            return Ok(false);
        };

        let mut tx = self.pool.begin().await?;
        sqlx::raw_sql(down_sql).execute(&mut *tx).await?;
        sqlx::query("DELETE FROM _router_migrations WHERE version = $1")
            .bind(version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(version, name = %migration.name, "Migration rolled back");
        Ok(true)
    }

    async fn ensure_tracking_table(&self) -> Result<(), MigrationError> {
        sqlx::raw_sql(
            r#"
            CREATE TABLE IF NOT EXISTS _router_migrations (
                version BIGINT PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                execution_time_ms BIGINT NOT NULL DEFAULT 0,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn applied_versions(&self) -> Result<Vec<(i64, String)>, MigrationError> {
        let rows = sqlx::query("SELECT version, checksum FROM _router_migrations ORDER BY version")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("version"), row.get("checksum")))
            .collect())
    }
}

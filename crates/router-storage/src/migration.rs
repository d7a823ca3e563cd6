//! Migration types.

use sha2::{Digest, Sha256};
use std::fmt;

/// A versioned database migration.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version (timestamp-based).
    pub version: i64,
    /// Migration name.
    pub name: String,
    /// SQL to apply the migration.
    pub up_sql: String,
    /// SQL to roll back the migration, when supported.
    pub down_sql: Option<String>,
    /// Checksum of the up SQL.
    pub checksum: String,
    /// Tags for categorizing migrations.
    pub tags: Vec<String>,
}

impl Migration {
    /// Create a migration builder.
    #[must_use]
    pub fn builder(version: i64, name: impl Into<String>) -> MigrationBuilder {
        MigrationBuilder::new(version, name)
    }

    /// Compute the checksum for SQL content.
    #[must_use]
    pub fn compute_checksum(sql: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(sql.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Verify the stored checksum against the up SQL.
    #[must_use]
    pub fn verify_checksum(&self) -> bool {
        Self::compute_checksum(&self.up_sql) == self.checksum
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "V{} - {}", self.version, self.name)
    }
}

/// Builder for migrations.
#[derive(Debug)]
pub struct MigrationBuilder {
    version: i64,
    name: String,
    up_sql: Option<String>,
    down_sql: Option<String>,
    tags: Vec<String>,
}

impl MigrationBuilder {
    /// Create a new builder.
    #[must_use]
    pub fn new(version: i64, name: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            up_sql: None,
            down_sql: None,
            tags: Vec::new(),
        }
    }

    /// Set the up SQL.
    #[must_use]
    pub fn up(mut self, sql: impl Into<String>) -> Self {
        self.up_sql = Some(sql.into());
        self
    }

    /// Set the down SQL.
    #[must_use]
    pub fn down(mut self, sql: impl Into<String>) -> Self {
        self.down_sql = Some(sql.into());
        self
    }

    /// Add a tag.
    #[must_use]
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Build the migration.
    ///
    /// # Panics
    /// Panics if up SQL is not set.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn build(self) -> Migration {
        let up_sql = self.up_sql.expect("up SQL is required");
        let checksum = Migration::compute_checksum(&up_sql);

        Migration {
            version: self.version,
            name: self.name,
            up_sql,
            down_sql: self.down_sql,
            checksum,
            tags: self.tags,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let m = Migration::builder(20240601000001, "create_agents")
            .up("CREATE TABLE agents (id UUID PRIMARY KEY);")
            .down("DROP TABLE agents;")
            .tag("core")
            .build();

        assert_eq!(m.version, 20240601000001);
        assert!(m.down_sql.is_some());
        assert_eq!(m.tags, vec!["core"]);
        assert!(m.verify_checksum());
    }

    #[test]
    fn test_checksums_differ() {
        assert_ne!(
            Migration::compute_checksum("SELECT 1;"),
            Migration::compute_checksum("SELECT 2;")
        );
    }
}

//! # Router Storage
//!
//! Relational persistence for the agent router.
//!
//! This crate provides:
//! - Versioned SQL migrations with checksums
//! - Narrow store traits consumed by the scoring, learning, and engine crates
//! - A Postgres implementation backed by sqlx
//! - An in-memory implementation for tests and storeless deployments

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod memory;
pub mod migration;
pub mod migrator;
pub mod pool;
pub mod postgres;
pub mod schema;
pub mod stores;

pub use memory::MemoryStore;
pub use migration::Migration;
pub use migrator::{MigrationError, Migrator};
pub use pool::{connect_pool, PoolConfig};
pub use postgres::PostgresStore;
pub use stores::{
    AgentAnalytics, AgentStats, AgentStore, LearningStore, MetricsStore, OutcomeStore,
    OverviewStats, PairingStats, PerformanceGroup, PerformanceSnapshotRow, ResolveOutcome,
    Storage, TaskTypeAnalytics,
};

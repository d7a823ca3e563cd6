//! # Router Config
//!
//! Process-wide configuration for the agent router.
//!
//! Configuration is loaded once at startup from a TOML file with
//! `ROUTER_`-prefixed environment overrides, and can be reloaded on an
//! explicit signal through [`ConfigHandle::reload`]. Deprecated or unknown
//! keys are ignored with a warning.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Top-level configuration record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// HTTP server settings.
    pub server: ServerSection,
    /// Relational store settings.
    pub database: DatabaseSection,
    /// Routing and circuit-breaker settings.
    pub routing: RoutingSection,
    /// Learning engine settings.
    pub learning: LearningSection,
    /// Background loop cadences.
    pub loops: LoopsSection,
    /// Logging settings.
    pub telemetry: TelemetrySection,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Per-request timeout.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8088,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Relational store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Connection URL. Empty selects the in-memory store.
    pub url: String,
    /// Maximum pool connections.
    pub max_connections: u32,
    /// Connection acquire timeout.
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Whether to apply pending migrations at startup.
    pub run_migrations: bool,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            connect_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }
}

/// Routing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    /// Scoring capacity bound per agent (not a hard ceiling).
    pub capacity_default: u32,
    /// Circuit breaker settings.
    pub breaker: BreakerSection,
}

impl Default for RoutingSection {
    fn default() -> Self {
        Self {
            capacity_default: 10,
            breaker: BreakerSection::default(),
        }
    }
}

/// Circuit breaker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSection {
    /// Failures before the breaker opens.
    pub failure_threshold: u32,
    /// How long an open breaker waits before admitting a probe, in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Successes required to close a half-open breaker.
    pub half_open_success_required: u32,
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_ms: 60_000,
            half_open_success_required: 3,
        }
    }
}

/// Learning engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LearningSection {
    /// Whether learning overrides and predictions are applied.
    pub enabled: bool,
    /// Incremental weight update rate.
    pub learning_rate: f64,
    /// Exploration probability for weight updates.
    pub exploration_rate: f64,
    /// Minimum confidence for surfacing a specialization.
    pub confidence_threshold: f64,
    /// Minimum samples per aggregation group.
    pub minimum_sample_size: u32,
    /// Predicted success rate below which alternatives are considered.
    pub prediction_threshold: f64,
}

impl Default for LearningSection {
    fn default() -> Self {
        Self {
            enabled: true,
            learning_rate: 0.01,
            exploration_rate: 0.1,
            confidence_threshold: 0.8,
            minimum_sample_size: 20,
            prediction_threshold: 0.6,
        }
    }
}

/// Background loop cadences, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopsSection {
    /// Performance score refresh cadence.
    pub performance_refresh_seconds: u64,
    /// Circuit breaker transition scan cadence.
    pub breaker_transitions_seconds: u64,
    /// Performance snapshot cadence.
    pub snapshots_seconds: u64,
    /// Specialization recomputation cadence.
    pub specialization_seconds: u64,
    /// Prediction validation cadence.
    pub prediction_validation_seconds: u64,
}

impl Default for LoopsSection {
    fn default() -> Self {
        Self {
            performance_refresh_seconds: 300,
            breaker_transitions_seconds: 30,
            snapshots_seconds: 600,
            specialization_seconds: 1800,
            prediction_validation_seconds: 14_400,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetrySection {
    /// Log level filter (e.g. `"info"`, `"router_engine=debug"`).
    pub log_level: String,
    /// Emit JSON-formatted logs.
    pub json_logs: bool,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
        }
    }
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that failed.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The file could not be parsed.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl RouterConfig {
    /// Load configuration from an optional file, then apply environment
    /// overrides. A missing path yields defaults plus overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let table: toml::Table = raw.parse()?;
                warn_unknown_keys(&table);
                table.try_into()?
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `ROUTER_<SECTION>_<KEY>` environment overrides for scalar keys.
    fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            let Some(rest) = key.strip_prefix("ROUTER_") else {
                continue;
            };
            match rest {
                "SERVER_HOST" => self.server.host = value,
                "SERVER_PORT" => parse_into(&key, &value, &mut self.server.port),
                "DATABASE_URL" => self.database.url = value,
                "DATABASE_MAX_CONNECTIONS" => {
                    parse_into(&key, &value, &mut self.database.max_connections);
                }
                "DATABASE_RUN_MIGRATIONS" => {
                    parse_into(&key, &value, &mut self.database.run_migrations);
                }
                "ROUTING_CAPACITY_DEFAULT" => {
                    parse_into(&key, &value, &mut self.routing.capacity_default);
                }
                "ROUTING_BREAKER_FAILURE_THRESHOLD" => {
                    parse_into(&key, &value, &mut self.routing.breaker.failure_threshold);
                }
                "ROUTING_BREAKER_RECOVERY_TIMEOUT_MS" => {
                    parse_into(&key, &value, &mut self.routing.breaker.recovery_timeout_ms);
                }
                "LEARNING_ENABLED" => parse_into(&key, &value, &mut self.learning.enabled),
                "LEARNING_LEARNING_RATE" => {
                    parse_into(&key, &value, &mut self.learning.learning_rate);
                }
                "LEARNING_PREDICTION_THRESHOLD" => {
                    parse_into(&key, &value, &mut self.learning.prediction_threshold);
                }
                "LEARNING_MINIMUM_SAMPLE_SIZE" => {
                    parse_into(&key, &value, &mut self.learning.minimum_sample_size);
                }
                "TELEMETRY_LOG_LEVEL" => self.telemetry.log_level = value,
                "TELEMETRY_JSON_LOGS" => parse_into(&key, &value, &mut self.telemetry.json_logs),
                _ => {}
            }
        }
    }

    /// Breaker recovery timeout as a [`Duration`].
    #[must_use]
    pub fn breaker_recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.routing.breaker.recovery_timeout_ms)
    }
}

fn parse_into<T: std::str::FromStr>(key: &str, value: &str, target: &mut T) {
    match value.parse() {
        Ok(parsed) => *target = parsed,
        Err(_) => warn!(key, value, "Ignoring unparseable environment override"),
    }
}

/// Known top-level sections and their keys, for deprecation warnings.
fn known_keys() -> BTreeSet<(&'static str, &'static str)> {
    let mut keys = BTreeSet::new();
    for key in ["host", "port", "request_timeout"] {
        keys.insert(("server", key));
    }
    for key in ["url", "max_connections", "connect_timeout", "run_migrations"] {
        keys.insert(("database", key));
    }
    for key in ["capacity_default", "breaker"] {
        keys.insert(("routing", key));
    }
    for key in [
        "enabled",
        "learning_rate",
        "exploration_rate",
        "confidence_threshold",
        "minimum_sample_size",
        "prediction_threshold",
    ] {
        keys.insert(("learning", key));
    }
    for key in [
        "performance_refresh_seconds",
        "breaker_transitions_seconds",
        "snapshots_seconds",
        "specialization_seconds",
        "prediction_validation_seconds",
    ] {
        keys.insert(("loops", key));
    }
    for key in ["log_level", "json_logs"] {
        keys.insert(("telemetry", key));
    }
    keys
}

fn warn_unknown_keys(table: &toml::Table) {
    const SECTIONS: [&str; 6] = [
        "server",
        "database",
        "routing",
        "learning",
        "loops",
        "telemetry",
    ];
    let known = known_keys();

    for (section, value) in table {
        if !SECTIONS.contains(&section.as_str()) {
            warn!(section, "Ignoring unknown config section");
            continue;
        }
        if let toml::Value::Table(entries) = value {
            for key in entries.keys() {
                if !known.contains(&(section.as_str(), key.as_str())) {
                    warn!(section, key, "Ignoring deprecated or unknown config key");
                }
            }
        }
    }
}

/// Shared, reloadable configuration handle.
pub struct ConfigHandle {
    current: ArcSwap<RouterConfig>,
    path: Option<PathBuf>,
}

impl ConfigHandle {
    /// Wrap a loaded configuration.
    #[must_use]
    pub fn new(config: RouterConfig, path: Option<PathBuf>) -> Self {
        Self {
            current: ArcSwap::from_pointee(config),
            path,
        }
    }

    /// Current configuration snapshot.
    #[must_use]
    pub fn get(&self) -> Arc<RouterConfig> {
        self.current.load_full()
    }

    /// Re-read the config file and swap the shared snapshot.
    ///
    /// Loops pick up cadence changes on their next tick.
    pub fn reload(&self) -> Result<(), ConfigError> {
        let config = RouterConfig::load(self.path.as_deref())?;
        info!("Configuration reloaded");
        self.current.store(Arc::new(config));
        Ok(())
    }
}

//! # Agent Router
//!
//! Context-aware routing service for a pool of LLM-backed agents.
//!
//! ## Features
//!
//! - Multi-criteria candidate scoring with load and deadline awareness
//! - Per-agent circuit breakers
//! - Outcome-driven routing-weight learning and success prediction
//! - Background maintenance loops with graceful shutdown
//!
//! ## Usage
//!
//! ```bash
//! # Start with default configuration (in-memory store)
//! agent-router
//!
//! # Start with a config file
//! agent-router --config /etc/agent-router/config.toml
//!
//! # Environment overrides
//! ROUTER_SERVER_PORT=9000 ROUTER_DATABASE_URL=postgres://... agent-router
//! ```

use anyhow::Context;
use router_config::{ConfigHandle, RouterConfig};
use router_engine::{
    AnalyticsReporter, ControlLoops, HealthMonitor, IntelligentRouter, OutcomeRecorder,
    RouterComponents,
};
use router_learning::{LearningEngine, LearningParams};
use router_registry::Registry;
use router_resilience::{BreakerRegistry, CircuitBreakerConfig, LoadTracker};
use router_scoring::{Scorer, Selector};
use router_server::{AppState, Server, ServerConfig, ShutdownCoordinator};
use router_storage::{
    connect_pool, schema, AgentStore as _, MemoryStore, MetricsStore, Migrator, PoolConfig,
    PostgresStore, Storage,
};
use router_telemetry::{init_logging, LoggingConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "Application failed");
        eprintln!("agent-router failed: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let config_path = config_path_from_args();
    let config = RouterConfig::load(config_path.as_deref()).context("loading configuration")?;

    init_logging(
        &LoggingConfig::new()
            .with_level(&config.telemetry.log_level)
            .with_json(config.telemetry.json_logs),
    )
    .context("initializing logging")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        "Starting agent router"
    );

    let config_handle = Arc::new(ConfigHandle::new(config.clone(), config_path));

    // Durable store: Postgres when a URL is configured, otherwise the
    // process-local store. The scorer and selector only need the metrics
    // surface, so both erased handles come from the same concrete store.
    let (store, metrics): (Arc<dyn Storage>, Arc<dyn MetricsStore>) =
        if config.database.url.is_empty() {
            warn!("No database URL configured, using the in-memory store");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        } else {
            let pool = connect_pool(
                &PoolConfig::new(&config.database.url)
                    .with_max_connections(config.database.max_connections)
                    .with_connect_timeout(config.database.connect_timeout),
            )
            .await
            .context("connecting to database")?;

            if config.database.run_migrations {
                let applied = Migrator::new(pool.clone())
                    .run(&schema::all_migrations())
                    .await
                    .context("running migrations")?;
                info!(applied, "Migrations complete");
            }
            let store = Arc::new(PostgresStore::new(pool));
            (store.clone(), store)
        };

    // Registry and breakers restore their durable rows at startup.
    let registry = Arc::new(Registry::new());
    for agent in store.load_agents().await.context("loading agents")? {
        registry.register(agent);
    }
    info!(agents = registry.len(), "Agent registry initialized");

    let breakers = Arc::new(BreakerRegistry::new(CircuitBreakerConfig {
        failure_threshold: config.routing.breaker.failure_threshold,
        success_threshold: config.routing.breaker.half_open_success_required,
        recovery_timeout: config.breaker_recovery_timeout(),
    }));
    breakers.restore(store.load_breakers().await.context("loading breakers")?);

    let load = Arc::new(LoadTracker::new(config.routing.capacity_default));
    let scorer = Arc::new(Scorer::new(metrics.clone(), load.clone()));
    let selector = Arc::new(Selector::new(metrics, load.clone()));

    let learning = Arc::new(LearningEngine::new(
        LearningParams {
            learning_rate: config.learning.learning_rate,
            exploration_rate: config.learning.exploration_rate,
            confidence_threshold: config.learning.confidence_threshold,
            minimum_sample_size: config.learning.minimum_sample_size,
        },
        store.clone(),
    ));
    learning
        .load_state(chrono::Utc::now())
        .await
        .context("loading learning state")?;

    let components = RouterComponents {
        registry: registry.clone(),
        breakers: breakers.clone(),
        load: load.clone(),
        scorer: scorer.clone(),
        selector,
        learning: learning.clone(),
    };
    let router = Arc::new(IntelligentRouter::new(
        components,
        config.learning.enabled,
        config.learning.prediction_threshold,
    ));

    let recorder = Arc::new(OutcomeRecorder::new(
        store.clone(),
        breakers.clone(),
        load.clone(),
        scorer.clone(),
        learning.clone(),
    ));
    let health = Arc::new(HealthMonitor::new(
        registry.clone(),
        load.clone(),
        store.clone(),
    ));
    let analytics = Arc::new(AnalyticsReporter::new(
        store.clone(),
        breakers.clone(),
        load.clone(),
        scorer.clone(),
        learning.clone(),
    ));

    // Shutdown coordination: OS signals flip one watch channel that the
    // server and every loop observe.
    let coordinator = Arc::new(ShutdownCoordinator::new());
    {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.listen_for_signals().await });
    }
    spawn_config_reload(config_handle.clone());

    let control = Arc::new(ControlLoops::new(
        config_handle.clone(),
        registry.clone(),
        breakers,
        load,
        scorer,
        learning.clone(),
        health.clone(),
        store,
    ));
    let loop_handles = control.clone().spawn(coordinator.subscribe());

    let state = AppState {
        config: config_handle,
        registry,
        router,
        recorder,
        health,
        analytics,
        learning,
    };
    let server = Server::new(
        ServerConfig::new(&config.server.host, config.server.port),
        state,
    );
    server
        .run(coordinator.signal())
        .await
        .context("running server")?;

    // Server has drained; stop the loops and flush live state.
    coordinator.trigger("server stopped");
    for handle in loop_handles {
        let _ = handle.await;
    }
    control.flush().await;

    info!("Agent router stopped");
    Ok(())
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    std::env::var("ROUTER_CONFIG").ok().map(PathBuf::from)
}

/// Reload configuration on SIGHUP.
#[cfg(unix)]
fn spawn_config_reload(config: Arc<ConfigHandle>) {
    tokio::spawn(async move {
        let Ok(mut hangup) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::hangup())
        else {
            warn!("SIGHUP handler unavailable, config reload disabled");
            return;
        };
        while hangup.recv().await.is_some() {
            if let Err(e) = config.reload() {
                warn!(error = %e, "Configuration reload failed");
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_config_reload(_config: Arc<ConfigHandle>) {}

//! Shared application state.

use router_config::ConfigHandle;
use router_engine::{AnalyticsReporter, HealthMonitor, IntelligentRouter, OutcomeRecorder};
use router_registry::Registry;
use std::sync::Arc;

/// Handles shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Configuration handle.
    pub config: Arc<ConfigHandle>,
    /// Agent registry.
    pub registry: Arc<Registry>,
    /// The routing engine.
    pub router: Arc<IntelligentRouter>,
    /// Outcome recording.
    pub recorder: Arc<OutcomeRecorder>,
    /// Health aggregation.
    pub health: Arc<HealthMonitor>,
    /// Analytics assembly.
    pub analytics: Arc<AnalyticsReporter>,
    /// Learning engine (for the optimization endpoint).
    pub learning: Arc<router_learning::LearningEngine>,
}

//! # Router Engine
//!
//! Composition layer of the routing service:
//! - [`IntelligentRouter`] wires candidates, breakers, scoring, and the
//!   learning overrides into a single routing call
//! - [`OutcomeRecorder`] applies outcome reports to durable and live state
//! - [`ControlLoops`] runs the background maintenance loops
//! - Health and analytics reporting

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod analytics;
pub mod health;
pub mod loops;
pub mod recorder;
pub mod router;

pub use analytics::{AnalyticsReporter, LearningAnalytics, RoutingAnalytics};
pub use health::HealthMonitor;
pub use loops::ControlLoops;
pub use recorder::{OutcomeRecorder, OutcomeReport, RecordAck};
pub use router::{IntelligentRouter, RouterComponents, SubtaskResult, SubtaskRouting};

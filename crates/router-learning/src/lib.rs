//! # Router Learning
//!
//! Learning engine that continuously improves dispatch decisions from
//! observed outcomes:
//! - Incremental routing-weight updates on every outcome
//! - Ensemble weight optimization over 30-day history
//! - Agent specialization detection
//! - Success probability prediction with confidence intervals

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod optimizer;
pub mod prediction;
pub mod specialization;

pub use engine::{LearningEngine, LearningParams, LearningStats};
pub use optimizer::ensemble_weights;
pub use specialization::detect_specializations;

//! # Router Scoring
//!
//! Multi-criteria candidate scoring and final selection:
//! - [`Scorer`] computes cached, load- and task-adjusted performance scores
//! - [`Selector`] ranks scored candidates, estimates time/cost, and emits
//!   the routing record

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod scorer;
pub mod selector;

pub use scorer::{ScoreDefaults, Scorer};
pub use selector::{ScoredCandidate, Selector};

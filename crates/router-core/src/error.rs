//! Router error types.
//!
//! Every error carries a stable kind string so callers can branch on the
//! kind without parsing messages, and an HTTP status for the API surface.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the routing service.
#[derive(Debug, Error, Clone, Serialize, Deserialize)]
pub enum RouterError {
    /// No active agent satisfies the task requirements.
    #[error("no capable agent: {message}")]
    NoCapableAgent {
        /// Description of the unmet requirement.
        message: String,
    },

    /// Capable agents exist but every one is gated by an open circuit breaker.
    #[error("all capable agents are circuit-broken")]
    AllBreakersOpen {
        /// Agents that were considered and rejected.
        rejected: Vec<String>,
    },

    /// The routing call exceeded the caller's deadline.
    #[error("routing timed out after {timeout_ms}ms")]
    RoutingTimeout {
        /// Timeout that was exceeded, in milliseconds.
        timeout_ms: u64,
    },

    /// Not enough history to answer (predictor or optimizer input).
    #[error("insufficient data: {message}")]
    InsufficientData {
        /// What was missing.
        message: String,
    },

    /// An outcome report referenced a routing id with no matching record.
    #[error("no routing record found for {routing_id}")]
    OutcomeNotFound {
        /// The unknown routing id.
        routing_id: String,
    },

    /// The optimizer had too few qualifying sample groups to run.
    #[error("optimization underflow: {samples} samples, {required} required")]
    OptimizationUnderflow {
        /// Samples that were available.
        samples: u64,
        /// Minimum required.
        required: u64,
    },

    /// The durable store could not be reached.
    #[error("persistence unavailable: {message}")]
    PersistenceUnavailable {
        /// Underlying failure description.
        message: String,
    },

    /// Unexpected internal failure.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl RouterError {
    /// Create a `NoCapableAgent` error.
    #[must_use]
    pub fn no_capable_agent(message: impl Into<String>) -> Self {
        Self::NoCapableAgent {
            message: message.into(),
        }
    }

    /// Create an `AllBreakersOpen` error.
    #[must_use]
    pub fn all_breakers_open(rejected: Vec<String>) -> Self {
        Self::AllBreakersOpen { rejected }
    }

    /// Create an `InsufficientData` error.
    #[must_use]
    pub fn insufficient_data(message: impl Into<String>) -> Self {
        Self::InsufficientData {
            message: message.into(),
        }
    }

    /// Create an `OutcomeNotFound` error.
    #[must_use]
    pub fn outcome_not_found(routing_id: impl Into<String>) -> Self {
        Self::OutcomeNotFound {
            routing_id: routing_id.into(),
        }
    }

    /// Create a `PersistenceUnavailable` error.
    #[must_use]
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::PersistenceUnavailable {
            message: message.into(),
        }
    }

    /// Create an `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable kind string for this error.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoCapableAgent { .. } => "NoCapableAgent",
            Self::AllBreakersOpen { .. } => "AllBreakersOpen",
            Self::RoutingTimeout { .. } => "RoutingTimeout",
            Self::InsufficientData { .. } => "InsufficientData",
            Self::OutcomeNotFound { .. } => "OutcomeNotFound",
            Self::OptimizationUnderflow { .. } => "OptimizationUnderflow",
            Self::PersistenceUnavailable { .. } => "PersistenceUnavailable",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// HTTP status code equivalent for the API surface.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoCapableAgent { .. } | Self::OutcomeNotFound { .. } => 404,
            Self::AllBreakersOpen { .. } | Self::PersistenceUnavailable { .. } => 503,
            Self::RoutingTimeout { .. } => 408,
            Self::InsufficientData { .. } | Self::OptimizationUnderflow { .. } => 422,
            Self::Internal { .. } => 500,
        }
    }

    /// Whether a caller may reasonably retry the same request.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::AllBreakersOpen { .. }
                | Self::RoutingTimeout { .. }
                | Self::PersistenceUnavailable { .. }
        )
    }
}

/// Result type for router operations.
pub type RouterResult<T> = Result<T, RouterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings() {
        assert_eq!(RouterError::no_capable_agent("x").kind(), "NoCapableAgent");
        assert_eq!(
            RouterError::all_breakers_open(vec![]).kind(),
            "AllBreakersOpen"
        );
        assert_eq!(
            RouterError::RoutingTimeout { timeout_ms: 100 }.kind(),
            "RoutingTimeout"
        );
        assert_eq!(RouterError::internal("boom").kind(), "InternalError");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(RouterError::no_capable_agent("x").http_status(), 404);
        assert_eq!(RouterError::all_breakers_open(vec![]).http_status(), 503);
        assert_eq!(
            RouterError::RoutingTimeout { timeout_ms: 5 }.http_status(),
            408
        );
        assert_eq!(RouterError::insufficient_data("x").http_status(), 422);
        assert_eq!(
            RouterError::OptimizationUnderflow {
                samples: 3,
                required: 20
            }
            .http_status(),
            422
        );
        assert_eq!(RouterError::internal("x").http_status(), 500);
    }

    #[test]
    fn test_retryability() {
        assert!(RouterError::all_breakers_open(vec![]).is_retryable());
        assert!(RouterError::persistence("down").is_retryable());
        assert!(!RouterError::no_capable_agent("x").is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = RouterError::outcome_not_found("r-123");
        assert_eq!(err.to_string(), "no routing record found for r-123");
    }
}

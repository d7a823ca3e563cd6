//! Identity newtypes and shared classification enums.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

/// Opaque identifier for a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(Uuid);

impl AgentId {
    /// Create a new random agent id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<Uuid> for AgentId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

/// Identifier for a single routing decision.
///
/// Generated when a selection is emitted and used later to join the
/// reported outcome back onto the routing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoutingId(Uuid);

impl RoutingId {
    /// Create a new random routing id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    #[must_use]
    pub const fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for RoutingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RoutingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle status of a registered agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Agent is available for routing.
    Active,
    /// Agent is registered but not taking traffic.
    Inactive,
    /// Agent has been marked failed by an operator or health check.
    Failed,
    /// Agent is temporarily rate limited by its provider.
    RateLimited,
}

impl AgentStatus {
    /// Stable string form used in persistence and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Failed => "failed",
            Self::RateLimited => "rate_limited",
        }
    }

    /// Parse from the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "failed" => Some(Self::Failed),
            "rate_limited" => Some(Self::RateLimited),
            _ => None,
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Qualitative load band derived from the in-flight ratio against capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadLevel {
    /// Below 30% of capacity.
    Low,
    /// 30-70% of capacity.
    Medium,
    /// 70-90% of capacity.
    High,
    /// 90% of capacity or more.
    Overloaded,
}

impl LoadLevel {
    /// Classify an in-flight/capacity ratio.
    #[must_use]
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio < 0.3 {
            Self::Low
        } else if ratio < 0.7 {
            Self::Medium
        } else if ratio < 0.9 {
            Self::High
        } else {
            Self::Overloaded
        }
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Overloaded => "overloaded",
        }
    }
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learned routing weight matrix: `weights[agent][task_key] ∈ [0, 1]`.
///
/// Task keys are `"<task_type>_<complexity>"` strings.
pub type WeightMatrix = HashMap<AgentId, HashMap<String, f64>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_id_roundtrip() {
        let id = AgentId::new();
        let json = serde_json::to_string(&id).unwrap();
        let parsed: AgentId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn test_agent_status_parse() {
        assert_eq!(AgentStatus::parse("active"), Some(AgentStatus::Active));
        assert_eq!(
            AgentStatus::parse("rate_limited"),
            Some(AgentStatus::RateLimited)
        );
        assert_eq!(AgentStatus::parse("bogus"), None);
    }

    #[test]
    fn test_load_level_bands() {
        assert_eq!(LoadLevel::from_ratio(0.0), LoadLevel::Low);
        assert_eq!(LoadLevel::from_ratio(0.29), LoadLevel::Low);
        assert_eq!(LoadLevel::from_ratio(0.3), LoadLevel::Medium);
        assert_eq!(LoadLevel::from_ratio(0.69), LoadLevel::Medium);
        assert_eq!(LoadLevel::from_ratio(0.7), LoadLevel::High);
        assert_eq!(LoadLevel::from_ratio(0.9), LoadLevel::Overloaded);
        assert_eq!(LoadLevel::from_ratio(1.5), LoadLevel::Overloaded);
    }

    #[test]
    fn test_weight_matrix_serializes_with_uuid_keys() {
        let mut weights: WeightMatrix = HashMap::new();
        let agent = AgentId::new();
        weights
            .entry(agent)
            .or_default()
            .insert("summarize_moderate".to_string(), 0.5);

        let json = serde_json::to_string(&weights).unwrap();
        let parsed: WeightMatrix = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[&agent]["summarize_moderate"], 0.5);
    }
}

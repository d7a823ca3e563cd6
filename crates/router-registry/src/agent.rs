//! Agent and capability records.

use chrono::{DateTime, Utc};
use router_core::{AgentId, AgentStatus};
use serde::{Deserialize, Serialize};

/// A registered agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    /// Opaque identity.
    pub id: AgentId,
    /// Display name, unique by convention.
    pub name: String,
    /// Lifecycle status.
    pub status: AgentStatus,
    /// Provider tag (e.g. `"anthropic"`, `"openai"`).
    pub provider: String,
    /// Registration time.
    pub created_at: DateTime<Utc>,
    /// Declared capabilities with priorities.
    pub capabilities: Vec<CapabilityLink>,
}

impl Agent {
    /// Create an ACTIVE agent with a fresh id and no capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(),
            name: name.into(),
            status: AgentStatus::Active,
            provider: provider.into(),
            created_at: Utc::now(),
            capabilities: Vec::new(),
        }
    }

    /// Add a capability link (priority clamped to 1-10).
    #[must_use]
    pub fn with_capability(mut self, capability: impl Into<String>, priority: u8) -> Self {
        self.capabilities.push(CapabilityLink {
            capability: capability.into(),
            priority: priority.clamp(1, 10),
        });
        self
    }

    /// Set the lifecycle status.
    #[must_use]
    pub fn with_status(mut self, status: AgentStatus) -> Self {
        self.status = status;
        self
    }

    /// Whether the agent declares the named capability.
    #[must_use]
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c.capability == capability)
    }

    /// Highest declared capability priority, 0 when none are declared.
    #[must_use]
    pub fn max_capability_priority(&self) -> u8 {
        self.capabilities
            .iter()
            .map(|c| c.priority)
            .max()
            .unwrap_or(0)
    }
}

/// An agent's declared capability with its priority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityLink {
    /// Capability name.
    pub capability: String,
    /// Priority 1-10, higher means the agent prefers this kind of work.
    pub priority: u8,
}

/// A capability known to the registry. Created on first reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Capability {
    /// Globally unique name.
    pub name: String,
    /// Grouping category.
    pub category: String,
    /// Optional structured parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl Capability {
    /// Create a capability with no parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            category: category.into(),
            parameters: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_builder() {
        let agent = Agent::new("coder-1", "anthropic")
            .with_capability("code_review", 9)
            .with_capability("bugfix", 12);

        assert_eq!(agent.status, AgentStatus::Active);
        assert!(agent.has_capability("code_review"));
        assert!(!agent.has_capability("vision"));
        // Priority clamped to 10
        assert_eq!(agent.max_capability_priority(), 10);
    }

    #[test]
    fn test_no_capabilities_priority() {
        let agent = Agent::new("plain", "openai");
        assert_eq!(agent.max_capability_priority(), 0);
    }
}

//! # Router Registry
//!
//! In-process table of registered agents and their capabilities.
//!
//! The registry owns agent rows exclusively: other components read
//! snapshots through accessor methods and never hold mutable references.
//! Candidate sets for routing are produced here according to the
//! preferred-agents / required-capabilities / all-active ladder.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;

pub use agent::{Agent, Capability, CapabilityLink};

use dashmap::DashMap;
use router_core::{AgentId, AgentStatus, RouterError, RouterResult, TaskContext};
use tracing::{debug, info};

/// Registry of agents available for routing.
pub struct Registry {
    agents: DashMap<AgentId, Agent>,
    capabilities: DashMap<String, Capability>,
}

impl Registry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            agents: DashMap::new(),
            capabilities: DashMap::new(),
        }
    }

    /// Register an agent, replacing any prior row with the same id.
    ///
    /// Capabilities referenced by the agent are created on first use.
    pub fn register(&self, agent: Agent) {
        for link in &agent.capabilities {
            self.capabilities
                .entry(link.capability.clone())
                .or_insert_with(|| Capability::new(&link.capability, "general"));
        }
        info!(
            agent_id = %agent.id,
            name = %agent.name,
            capabilities = agent.capabilities.len(),
            "Agent registered"
        );
        self.agents.insert(agent.id, agent);
    }

    /// Remove an agent.
    pub fn deregister(&self, agent_id: AgentId) -> Option<Agent> {
        let removed = self.agents.remove(&agent_id).map(|(_, agent)| agent);
        if let Some(ref agent) = removed {
            info!(agent_id = %agent.id, name = %agent.name, "Agent deregistered");
        }
        removed
    }

    /// Update an agent's lifecycle status.
    pub fn set_status(&self, agent_id: AgentId, status: AgentStatus) -> bool {
        match self.agents.get_mut(&agent_id) {
            Some(mut agent) => {
                debug!(agent_id = %agent_id, status = %status, "Agent status updated");
                agent.status = status;
                true
            }
            None => false,
        }
    }

    /// Fetch a snapshot of one agent.
    #[must_use]
    pub fn get(&self, agent_id: AgentId) -> Option<Agent> {
        self.agents.get(&agent_id).map(|a| a.value().clone())
    }

    /// Fetch a snapshot of one agent by display name.
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<Agent> {
        self.agents
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value().clone())
    }

    /// Number of registered agents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.agents.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// Snapshot of every registered agent.
    #[must_use]
    pub fn all(&self) -> Vec<Agent> {
        self.agents.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Snapshot of every ACTIVE agent.
    #[must_use]
    pub fn active(&self) -> Vec<Agent> {
        self.agents
            .iter()
            .filter(|entry| entry.status == AgentStatus::Active)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Known capability catalog.
    #[must_use]
    pub fn capabilities(&self) -> Vec<Capability> {
        self.capabilities.iter().map(|entry| entry.value().clone()).collect()
    }

    /// Produce the ordered candidate set for a task.
    ///
    /// Rules, in order:
    /// 1. If preferred agents are named and any exist ACTIVE, exactly those
    ///    are returned in caller order.
    /// 2. Else if capabilities are required, ACTIVE agents whose capability
    ///    set is a superset are returned, ordered by descending capability
    ///    priority then ascending creation time.
    /// 3. Else all ACTIVE agents in the same order.
    ///
    /// # Errors
    /// Returns `NoCapableAgent` when the resulting set is empty.
    pub fn candidates(&self, task: &TaskContext) -> RouterResult<Vec<Agent>> {
        if !task.preferred_agents.is_empty() {
            let preferred: Vec<Agent> = task
                .preferred_agents
                .iter()
                .filter_map(|name| self.get_by_name(name))
                .filter(|agent| agent.status == AgentStatus::Active)
                .collect();
            if !preferred.is_empty() {
                return Ok(preferred);
            }
        }

        let mut matched: Vec<Agent> = if task.required_capabilities.is_empty() {
            self.active()
        } else {
            self.active()
                .into_iter()
                .filter(|agent| {
                    task.required_capabilities
                        .iter()
                        .all(|cap| agent.has_capability(cap))
                })
                .collect()
        };

        if matched.is_empty() {
            let detail = if task.required_capabilities.is_empty() {
                "no active agents registered".to_string()
            } else {
                format!(
                    "no active agent declares [{}]",
                    task.required_capabilities.join(", ")
                )
            };
            return Err(RouterError::no_capable_agent(detail));
        }

        matched.sort_by(|a, b| {
            b.max_capability_priority()
                .cmp(&a.max_capability_priority())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(matched)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

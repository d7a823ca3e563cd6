//! Task descriptions used as routing input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse task complexity classification used as a routing feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskComplexity {
    /// Basic queries, single operations.
    Simple,
    /// Multi-step operations, some reasoning.
    Moderate,
    /// Advanced reasoning, coordination-heavy work.
    Complex,
    /// High-stakes work that should go to the best agents.
    Critical,
}

impl TaskComplexity {
    /// Stable string form used in task keys and persistence.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Simple => "simple",
            Self::Moderate => "moderate",
            Self::Complex => "complex",
            Self::Critical => "critical",
        }
    }

    /// Parse from the stable string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "simple" => Some(Self::Simple),
            "moderate" => Some(Self::Moderate),
            "complex" => Some(Self::Complex),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    /// Default completion estimate in seconds when no history exists.
    #[must_use]
    pub fn default_completion_seconds(&self) -> f64 {
        match self {
            Self::Simple => 2.0,
            Self::Moderate => 10.0,
            Self::Complex => 30.0,
            Self::Critical => 60.0,
        }
    }

    /// Default cost estimate in cents when no history exists.
    #[must_use]
    pub fn default_cost_cents(&self) -> i64 {
        match self {
            Self::Simple => 1,
            Self::Moderate => 5,
            Self::Complex => 20,
            Self::Critical => 50,
        }
    }
}

impl fmt::Display for TaskComplexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context describing a single task to be routed.
///
/// Ephemeral: never persisted as a first-class row. The routing record
/// embeds the fields it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Free-form task type tag (e.g. `"summarize"`, `"code_review"`).
    pub task_type: String,
    /// Complexity classification.
    pub complexity: TaskComplexity,
    /// Priority 1-10, higher is more important.
    #[serde(default = "default_priority")]
    pub priority: u8,
    /// Absolute deadline, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Owning project.
    #[serde(default = "default_project")]
    pub project_id: String,
    /// Requesting user.
    #[serde(default = "default_user")]
    pub user_id: String,
    /// Capabilities the agent must declare.
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    /// Agent names to prefer, in caller order.
    #[serde(default)]
    pub preferred_agents: Vec<String>,
    /// Agent names to fall back to, in caller order.
    #[serde(default)]
    pub fallback_agents: Vec<String>,
    /// Whether the task carries sensitive data.
    #[serde(default)]
    pub sensitive_data: bool,
    /// Opaque caller metadata.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

fn default_priority() -> u8 {
    5
}

fn default_project() -> String {
    "default".to_string()
}

fn default_user() -> String {
    "system".to_string()
}

impl TaskContext {
    /// Start building a task context.
    #[must_use]
    pub fn builder(task_type: impl Into<String>, complexity: TaskComplexity) -> TaskContextBuilder {
        TaskContextBuilder::new(task_type, complexity)
    }

    /// Key used to group history by `(task_type, complexity)`.
    #[must_use]
    pub fn task_key(&self) -> String {
        format!("{}_{}", self.task_type, self.complexity.as_str())
    }

    /// Seconds until the deadline, if one is set and still in the future.
    #[must_use]
    pub fn seconds_until_deadline(&self, now: DateTime<Utc>) -> Option<f64> {
        self.deadline.map(|d| (d - now).num_milliseconds() as f64 / 1000.0)
    }
}

/// Builder for [`TaskContext`].
#[derive(Debug, Clone)]
pub struct TaskContextBuilder {
    task: TaskContext,
}

impl TaskContextBuilder {
    /// Create a builder with the required fields.
    #[must_use]
    pub fn new(task_type: impl Into<String>, complexity: TaskComplexity) -> Self {
        Self {
            task: TaskContext {
                task_type: task_type.into(),
                complexity,
                priority: default_priority(),
                deadline: None,
                project_id: default_project(),
                user_id: default_user(),
                required_capabilities: Vec::new(),
                preferred_agents: Vec::new(),
                fallback_agents: Vec::new(),
                sensitive_data: false,
                metadata: serde_json::Value::Null,
            },
        }
    }

    /// Set the priority (clamped to 1-10).
    #[must_use]
    pub fn priority(mut self, priority: u8) -> Self {
        self.task.priority = priority.clamp(1, 10);
        self
    }

    /// Set an absolute deadline.
    #[must_use]
    pub fn deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.task.deadline = Some(deadline);
        self
    }

    /// Set the owning project.
    #[must_use]
    pub fn project(mut self, project_id: impl Into<String>) -> Self {
        self.task.project_id = project_id.into();
        self
    }

    /// Set the requesting user.
    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.task.user_id = user_id.into();
        self
    }

    /// Add a required capability.
    #[must_use]
    pub fn require_capability(mut self, capability: impl Into<String>) -> Self {
        self.task.required_capabilities.push(capability.into());
        self
    }

    /// Set the preferred agent names.
    #[must_use]
    pub fn preferred_agents(mut self, agents: Vec<String>) -> Self {
        self.task.preferred_agents = agents;
        self
    }

    /// Set the fallback agent names.
    #[must_use]
    pub fn fallback_agents(mut self, agents: Vec<String>) -> Self {
        self.task.fallback_agents = agents;
        self
    }

    /// Mark the task as carrying sensitive data.
    #[must_use]
    pub fn sensitive(mut self, sensitive: bool) -> Self {
        self.task.sensitive_data = sensitive;
        self
    }

    /// Attach opaque metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.task.metadata = metadata;
        self
    }

    /// Finish building.
    #[must_use]
    pub fn build(self) -> TaskContext {
        self.task
    }
}

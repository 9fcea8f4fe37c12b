//! Configuration-owned entities: agents, tools and workflows
//!
//! These are immutable during a turn. They are loaded from the built-in
//! catalog and the configuration file, never from conversations.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Capability flag that enables retrieval before the first provider call
pub const CAPABILITY_RAG: &str = "rag";

/// A named agent configuration that can take a conversational turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    /// Unique slug (e.g. `legal-research`)
    pub slug: String,

    /// Display name
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Model identifier passed to the LLM provider
    pub model: String,

    pub system_prompt: String,

    #[serde(default)]
    pub capabilities: BTreeSet<String>,

    /// Tool slugs this agent exposes to the model
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default)]
    pub config: AgentSettings,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Per-agent overrides of the execution defaults
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_timeout_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Number of sources retrieved for RAG-capable agents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retrieval_top_k: Option<usize>,
}

impl Agent {
    /// Check whether the agent declares a capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// A callable capability with a declared parameter schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Unique slug used for dispatch
    pub slug: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Name the model uses when requesting the tool
    pub function_name: String,

    /// JSON Schema for the call parameters
    pub parameters_schema: serde_json::Value,

    #[serde(default)]
    pub requires_auth: bool,

    /// Agents permitted to call the tool; `None` means all agents
    #[serde(default)]
    pub allowed_agents: Option<Vec<String>>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

impl Tool {
    /// A tool is allowed for an agent if `allowed_agents` is unset or lists the agent
    pub fn is_allowed_for(&self, agent_slug: &str) -> bool {
        match &self.allowed_agents {
            None => true,
            Some(agents) => agents.iter().any(|a| a == agent_slug),
        }
    }
}

/// Ordered sequence of agents executed in series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub slug: String,

    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Agent slugs in execution order
    pub agent_sequence: Vec<String>,

    /// Step settings keyed by agent slug
    #[serde(default)]
    pub steps: HashMap<String, StepConfig>,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Settings applied to one workflow step
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Extra instructions prepended to the step input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_iterations: Option<usize>,
}

impl Workflow {
    /// Settings for the given agent's step, if any
    pub fn step_config(&self, agent_slug: &str) -> Option<&StepConfig> {
        self.steps.get(agent_slug)
    }

    pub fn len(&self) -> usize {
        self.agent_sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agent_sequence.is_empty()
    }
}

fn default_true() -> bool {
    true
}

//! Tool registry with JSON schemas
//!
//! Maps a stable tool slug to its configuration, its executable
//! capability and the compiled validator for its parameter schema.

use crate::errors::{AgentError, Result};
use crate::llm::ToolDefinition;
use crate::tools::types::ToolCapability;
use crate::types::{Agent, Tool};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A registered tool
#[derive(Clone)]
pub struct RegisteredTool {
    pub tool: Tool,
    pub capability: Arc<dyn ToolCapability>,
    validator: Arc<jsonschema::Validator>,
}

impl RegisteredTool {
    /// Validate parameters, returning every violation in one message
    pub fn validate(&self, params: &serde_json::Value) -> Result<()> {
        let errors: Vec<String> = self
            .validator
            .iter_errors(params)
            .map(|e| e.to_string())
            .collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AgentError::Validation(format!(
                "invalid parameters for '{}': {}",
                self.tool.slug,
                errors.join("; ")
            )))
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.tool.function_name.clone(),
            description: self.tool.description.clone(),
            parameters: self.tool.parameters_schema.clone(),
        }
    }
}

impl fmt::Debug for RegisteredTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredTool")
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

/// Tool registry
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    /// Map of tool slug to registration
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; replaces an existing registration with the same slug
    pub fn register(&mut self, tool: Tool, capability: Arc<dyn ToolCapability>) -> Result<()> {
        let validator = jsonschema::draft202012::new(&tool.parameters_schema).map_err(|e| {
            AgentError::Validation(format!("invalid schema for tool '{}': {}", tool.slug, e))
        })?;

        if let Some(existing) = self
            .tools
            .values()
            .find(|t| t.tool.function_name == tool.function_name && t.tool.slug != tool.slug)
        {
            return Err(AgentError::Validation(format!(
                "function name '{}' already used by tool '{}'",
                tool.function_name, existing.tool.slug
            )));
        }

        self.tools.insert(
            tool.slug.clone(),
            RegisteredTool {
                tool,
                capability,
                validator: Arc::new(validator),
            },
        );
        Ok(())
    }

    /// Get a tool by slug, active or not
    pub fn get(&self, slug: &str) -> Option<&RegisteredTool> {
        self.tools.get(slug)
    }

    /// Resolve the slug of the tool the model requested by function name
    pub fn slug_for_function(&self, function_name: &str) -> Option<&str> {
        self.tools
            .values()
            .find(|t| t.tool.function_name == function_name)
            .map(|t| t.tool.slug.as_str())
    }

    /// Definitions exposed to an agent: its tools that are active and allow it
    pub fn definitions_for(&self, agent: &Agent) -> Vec<ToolDefinition> {
        agent
            .tools
            .iter()
            .filter_map(|slug| self.tools.get(slug))
            .filter(|t| t.tool.is_active && t.tool.is_allowed_for(&agent.slug))
            .map(RegisteredTool::definition)
            .collect()
    }

    /// All registered tools, sorted by slug
    pub fn list(&self) -> Vec<&Tool> {
        let mut tools: Vec<&Tool> = self.tools.values().map(|t| &t.tool).collect();
        tools.sort_by(|a, b| a.slug.cmp(&b.slug));
        tools
    }

    /// Mark a tool active or inactive
    pub fn set_active(&mut self, slug: &str, active: bool) -> Result<()> {
        let entry = self
            .tools
            .get_mut(slug)
            .ok_or_else(|| AgentError::not_found("Tool", slug))?;
        entry.tool.is_active = active;
        Ok(())
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.tools.contains_key(slug)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

//! Agent and workflow catalog
//!
//! Owns the configured agents and workflows. Lookups only return active
//! entries; inactive ones are reported as not found.

pub mod defaults;

pub use defaults::{
    builtin_agents, builtin_workflows, CASE_STRATEGY, DOCUMENT_ANALYZER, FULL_CASE_ANALYSIS,
    LEGAL_RESEARCH, PETITION_WRITER,
};

use crate::errors::{AgentError, Result};
use crate::types::{Agent, Workflow};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct AgentCatalog {
    agents: HashMap<String, Agent>,
    workflows: HashMap<String, Workflow>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in agents and workflows
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for agent in builtin_agents() {
            catalog.upsert_agent(agent);
        }
        for workflow in builtin_workflows() {
            catalog.upsert_workflow(workflow);
        }
        catalog
    }

    /// Add or replace an agent
    pub fn upsert_agent(&mut self, agent: Agent) {
        debug!(agent = %agent.slug, "catalog agent registered");
        self.agents.insert(agent.slug.clone(), agent);
    }

    /// Add or replace a workflow
    pub fn upsert_workflow(&mut self, workflow: Workflow) {
        debug!(workflow = %workflow.slug, "catalog workflow registered");
        self.workflows.insert(workflow.slug.clone(), workflow);
    }

    /// Active agent by slug
    pub fn agent(&self, slug: &str) -> Result<&Agent> {
        self.agents
            .get(slug)
            .filter(|a| a.is_active)
            .ok_or_else(|| AgentError::not_found("Agent", slug))
    }

    /// Active workflow by slug
    pub fn workflow(&self, slug: &str) -> Result<&Workflow> {
        self.workflows
            .get(slug)
            .filter(|w| w.is_active)
            .ok_or_else(|| AgentError::not_found("Workflow", slug))
    }

    /// Agents of an active workflow in step order
    pub fn resolve_sequence(&self, workflow: &Workflow) -> Result<Vec<&Agent>> {
        if workflow.is_empty() {
            return Err(AgentError::Validation(format!(
                "workflow '{}' has no steps",
                workflow.slug
            )));
        }
        workflow
            .agent_sequence
            .iter()
            .map(|slug| {
                self.agent(slug).map_err(|_| {
                    AgentError::Validation(format!(
                        "workflow '{}' references unknown or inactive agent '{}'",
                        workflow.slug, slug
                    ))
                })
            })
            .collect()
    }

    /// Active agents sorted by slug
    pub fn list_agents(&self) -> Vec<&Agent> {
        let mut agents: Vec<&Agent> = self.agents.values().filter(|a| a.is_active).collect();
        agents.sort_by(|a, b| a.slug.cmp(&b.slug));
        agents
    }

    /// Active workflows sorted by slug
    pub fn list_workflows(&self) -> Vec<&Workflow> {
        let mut workflows: Vec<&Workflow> =
            self.workflows.values().filter(|w| w.is_active).collect();
        workflows.sort_by(|a, b| a.slug.cmp(&b.slug));
        workflows
    }

    /// Check that every active workflow resolves
    pub fn validate(&self) -> Result<()> {
        for workflow in self.list_workflows() {
            self.resolve_sequence(workflow)?;
        }
        Ok(())
    }
}

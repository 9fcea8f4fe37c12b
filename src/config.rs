//! Configuration management for lexflow
//!
//! TOML file with defaults and validation.
//! Location: ~/.lexflow/config.toml

use crate::agent::ExecutorConfig;
use crate::budget::TurnBudget;
use crate::catalog::AgentCatalog;
use crate::errors::{AgentError, Result};
use crate::llm::ollama::{DEFAULT_EMBEDDING_MODEL, DEFAULT_MODEL};
use crate::llm::RetryPolicy;
use crate::rag::RetrievalConfig;
use crate::types::{Agent, Workflow};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Complete configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Agents added to, or replacing, the built-in catalog
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub agents: Vec<Agent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub workflows: Vec<Workflow>,
}

/// LLM and embedding server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub host: String,
    pub port: u16,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub request_timeout_secs: u64,
}

/// Agent turn limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub max_tool_iterations: usize,
    pub turn_timeout_secs: u64,
    pub provider_call_timeout_secs: u64,
    /// Attempts per provider call, including the first
    pub provider_retries: u32,
    pub retry_base_delay_ms: u64,
    pub max_history_messages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
    /// In [0, 100]
    pub min_confidence: f32,
    pub context_token_budget: usize,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub max_parallel: usize,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_path: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 11434,
            chat_model: DEFAULT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimensions: 768,
            request_timeout_secs: 60,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let budget = TurnBudget::default();
        Self {
            max_tool_iterations: budget.max_tool_iterations,
            turn_timeout_secs: budget.time_budget.as_secs(),
            provider_call_timeout_secs: 60,
            provider_retries: 3,
            retry_base_delay_ms: 500,
            max_history_messages: crate::agent::MAX_HISTORY_MESSAGES,
        }
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let retrieval = RetrievalConfig::default();
        Self {
            top_k: retrieval.top_k,
            min_confidence: retrieval.min_confidence,
            context_token_budget: retrieval.context_token_budget,
            call_timeout_secs: retrieval.call_timeout.as_secs(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            max_parallel: crate::tools::invoker::MAX_PARALLEL_CALLS,
            call_timeout_secs: crate::tools::invoker::DEFAULT_CALL_TIMEOUT.as_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            database_path: "~/.lexflow/lexflow.db".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Self::load_default(),
        }
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| AgentError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Default location if the file exists, built-in defaults otherwise
    pub fn load_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from_file(&path),
            _ => Ok(Config::default()),
        }
    }

    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".lexflow").join("config.toml"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.execution.max_tool_iterations == 0 {
            return Err(AgentError::Config(
                "max_tool_iterations must be greater than 0".to_string(),
            ));
        }
        if self.execution.turn_timeout_secs == 0 || self.execution.provider_call_timeout_secs == 0
        {
            return Err(AgentError::Config(
                "turn and provider timeouts must be greater than 0".to_string(),
            ));
        }
        if self.execution.provider_retries == 0 {
            return Err(AgentError::Config(
                "provider_retries counts attempts and must be at least 1".to_string(),
            ));
        }
        if !(0.0..=100.0).contains(&self.rag.min_confidence) {
            return Err(AgentError::Config(format!(
                "min_confidence must be between 0 and 100, got {}",
                self.rag.min_confidence
            )));
        }
        if self.rag.top_k == 0 {
            return Err(AgentError::Config("rag top_k must be greater than 0".to_string()));
        }
        if self.provider.embedding_dimensions == 0 {
            return Err(AgentError::Config(
                "embedding_dimensions must be greater than 0".to_string(),
            ));
        }
        if self.tools.max_parallel == 0 {
            return Err(AgentError::Config(
                "tools max_parallel must be greater than 0".to_string(),
            ));
        }

        self.catalog()
            .map(|_| ())
            .map_err(|e| AgentError::Config(e.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| AgentError::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn provider_url(&self) -> String {
        format!("http://{}:{}", self.provider.host, self.provider.port)
    }

    /// Expand a leading `~/`
    pub fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    pub fn database_path(&self) -> PathBuf {
        Self::expand_path(&self.storage.database_path)
    }

    /// Built-in catalog on the configured chat model, extended by the
    /// configured agents and workflows
    pub fn catalog(&self) -> Result<AgentCatalog> {
        let mut catalog = AgentCatalog::new();
        for mut agent in crate::catalog::builtin_agents() {
            agent.model = self.provider.chat_model.clone();
            catalog.upsert_agent(agent);
        }
        for workflow in crate::catalog::builtin_workflows() {
            catalog.upsert_workflow(workflow);
        }
        for agent in &self.agents {
            catalog.upsert_agent(agent.clone());
        }
        for workflow in &self.workflows {
            catalog.upsert_workflow(workflow.clone());
        }
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_config(
            self.execution.provider_retries,
            self.execution.retry_base_delay_ms,
        )
    }

    pub fn executor_config(&self) -> ExecutorConfig {
        ExecutorConfig {
            budget: TurnBudget::new(
                self.execution.max_tool_iterations,
                Duration::from_secs(self.execution.turn_timeout_secs),
            ),
            provider_call_timeout: Duration::from_secs(self.execution.provider_call_timeout_secs),
            max_history_messages: self.execution.max_history_messages,
            retry: self.retry_policy(),
        }
    }

    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            top_k: self.rag.top_k,
            min_confidence: self.rag.min_confidence,
            context_token_budget: self.rag.context_token_budget,
            call_timeout: Duration::from_secs(self.rag.call_timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.provider_url(), "http://127.0.0.1:11434");
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [execution]
            max_tool_iterations = 3

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.execution.max_tool_iterations, 3);
        assert_eq!(config.execution.turn_timeout_secs, 120);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert_eq!(config.rag.top_k, 5);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.execution.max_tool_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.rag.min_confidence = 120.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_workflow_with_unknown_agent_rejected() {
        let config: Config = toml::from_str(
            r#"
            [[workflows]]
            slug = "appeal"
            name = "Appeal"
            agent_sequence = ["legal-research", "appeal-writer"]
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(AgentError::Config(_))));
    }

    #[test]
    fn test_configured_agent_extends_catalog() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            chat_model = "llama3.1:8b"

            [[agents]]
            slug = "appeal-writer"
            name = "Appeal Writer"
            model = "llama3.1:70b"
            system_prompt = "Você redige recursos."
            tools = ["search_jurisprudence"]

            [[workflows]]
            slug = "appeal"
            name = "Appeal"
            agent_sequence = ["legal-research", "appeal-writer"]
            "#,
        )
        .unwrap();
        let catalog = config.catalog().unwrap();
        assert_eq!(catalog.agent("legal-research").unwrap().model, "llama3.1:8b");
        assert_eq!(catalog.agent("appeal-writer").unwrap().model, "llama3.1:70b");
        assert!(catalog.workflow("appeal").is_ok());
    }

    #[test]
    fn test_expand_path() {
        assert!(!Config::expand_path("~/.lexflow").to_string_lossy().contains('~'));
        assert_eq!(Config::expand_path("/tmp/x.db"), PathBuf::from("/tmp/x.db"));
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut config = Config::default();
        config.rag.top_k = 8;
        config.save(&path).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.rag.top_k, 8);
    }
}

//! Error types for the lexflow engine
//!
//! Provides the error taxonomy shared by the executor, tool invoker,
//! retriever, workflow engine and persistence layers.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the agent engine
#[derive(Error, Debug)]
pub enum AgentError {
    /// Referenced agent, tool, workflow, conversation or entry is missing or inactive
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Parameters or references failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Caller or agent is not allowed to perform the operation
    #[error("Permission denied: {0}")]
    Permission(String),

    /// LLM or embedding provider failure
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool-call iteration budget exhausted
    #[error("{0}")]
    BudgetExceeded(String),

    /// Timeout errors
    #[error("Operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Turn cancelled by the caller
    #[error("Execution cancelled: {0}")]
    Cancelled(String),

    /// State machine transition errors
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// Structured failure of a recorded execution
    #[error("{0}")]
    ExecutionFailed(Box<ExecutionFailure>),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic errors with context
    #[error("Agent error: {0}")]
    Generic(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, AgentError>;

/// Stable error category, safe to persist and expose to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Validation,
    Permission,
    Provider,
    BudgetExceeded,
    Timeout,
    Cancelled,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Validation => "validation",
            ErrorKind::Permission => "permission",
            ErrorKind::Provider => "provider",
            ErrorKind::BudgetExceeded => "budget_exceeded",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Failure descriptor returned when a recorded execution fails.
///
/// Carries enough context (execution id, failing step, message) for a
/// caller to display the failure or trigger a retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub execution_id: Uuid,
    pub agent_slug: String,
    pub workflow_slug: Option<String>,
    pub step_index: Option<usize>,
    pub kind: ErrorKind,
    pub message: String,
    pub tokens_used: u64,
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "execution {} of agent '{}' failed ({}): {}",
            self.execution_id, self.agent_slug, self.kind, self.message
        )?;
        if let (Some(workflow), Some(step)) = (&self.workflow_slug, self.step_index) {
            write!(f, " [workflow '{}' step {}]", workflow, step + 1)?;
        }
        Ok(())
    }
}

impl AgentError {
    /// Shorthand for a missing entity
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        AgentError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Classify the error into the stable taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            AgentError::NotFound { .. } => ErrorKind::NotFound,
            AgentError::Validation(_) => ErrorKind::Validation,
            AgentError::Permission(_) => ErrorKind::Permission,
            AgentError::Provider(_) | AgentError::Http(_) => ErrorKind::Provider,
            AgentError::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
            AgentError::Timeout { .. } => ErrorKind::Timeout,
            AgentError::Cancelled(_) => ErrorKind::Cancelled,
            AgentError::ExecutionFailed(failure) => failure.kind,
            AgentError::InvalidTransition { .. }
            | AgentError::Serialization(_)
            | AgentError::Storage(_)
            | AgentError::Io(_)
            | AgentError::Config(_)
            | AgentError::Generic(_) => ErrorKind::Internal,
        }
    }

    /// Whether a bounded retry may succeed (transient provider failures only)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AgentError::Provider(_) | AgentError::Http(_) | AgentError::Timeout { .. }
        )
    }

    /// Structured failure descriptor, if this error came from a recorded execution
    pub fn execution_failure(&self) -> Option<&ExecutionFailure> {
        match self {
            AgentError::ExecutionFailed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<ExecutionFailure> for AgentError {
    fn from(failure: ExecutionFailure) -> Self {
        AgentError::ExecutionFailed(Box::new(failure))
    }
}

impl From<rusqlite::Error> for AgentError {
    fn from(err: rusqlite::Error) -> Self {
        AgentError::Storage(err.to_string())
    }
}

impl From<r2d2::Error> for AgentError {
    fn from(err: r2d2::Error) -> Self {
        AgentError::Storage(format!("connection pool: {}", err))
    }
}

impl From<bincode::Error> for AgentError {
    fn from(err: bincode::Error) -> Self {
        AgentError::Storage(format!("embedding encoding: {}", err))
    }
}

/// Convert anyhow errors to AgentError
impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Generic(err.to_string())
    }
}

//! Tool execution types and structures
//!
//! Core types for tool dispatch, results, and caller identity.

use crate::errors::{AgentError, ErrorKind, Result};
use crate::types::NewCitation;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Parameter key under which the invoker injects the caller identity
pub const CALLER_PARAM: &str = "_caller";

/// Result of a tool invocation; errors are values, never thrown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Tool slug that was invoked
    pub tool: String,

    /// Whether execution was successful
    pub success: bool,

    /// Result data on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,

    /// Error message on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Error category on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,

    /// Sources the tool consulted
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<NewCitation>,

    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ToolResult {
    /// Create successful result
    pub fn success(tool: impl Into<String>, output: ToolOutput, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            success: true,
            result: Some(output.value),
            error: None,
            error_kind: None,
            citations: output.citations,
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// Create failed result
    pub fn failure(tool: impl Into<String>, error: &AgentError, duration: Duration) -> Self {
        Self {
            tool: tool.into(),
            success: false,
            result: None,
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            citations: Vec::new(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// JSON fed back to the model as the tool message content
    pub fn to_model_content(&self) -> String {
        let value = if self.success {
            serde_json::json!({ "success": true, "result": self.result })
        } else {
            serde_json::json!({ "success": false, "error": self.error })
        };
        value.to_string()
    }
}

/// Value returned by a tool capability
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToolOutput {
    pub value: serde_json::Value,
    pub citations: Vec<NewCitation>,
}

impl ToolOutput {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            citations: Vec::new(),
        }
    }

    pub fn with_citations(mut self, citations: Vec<NewCitation>) -> Self {
        self.citations = citations;
        self
    }
}

impl From<serde_json::Value> for ToolOutput {
    fn from(value: serde_json::Value) -> Self {
        Self::new(value)
    }
}

/// Who is invoking a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallerIdentity {
    /// Authenticated user, if any
    pub user_id: Option<String>,

    /// Agent running the turn
    pub agent_slug: String,

    pub conversation_id: Option<Uuid>,
}

impl CallerIdentity {
    pub fn new(user_id: Option<String>, agent_slug: impl Into<String>) -> Self {
        Self {
            user_id,
            agent_slug: agent_slug.into(),
            conversation_id: None,
        }
    }

    pub fn with_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }

    /// Read the identity injected by the invoker
    pub fn from_params(params: &serde_json::Value) -> Result<Self> {
        let raw = params
            .get(CALLER_PARAM)
            .ok_or_else(|| AgentError::Permission("caller identity missing".to_string()))?;
        Ok(serde_json::from_value(raw.clone())?)
    }

    /// The authenticated user, or a permission error
    pub fn require_user(&self) -> Result<&str> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AgentError::Permission("authenticated caller required".to_string()))
    }
}

/// Executable capability behind a tool slug
#[async_trait]
pub trait ToolCapability: Send + Sync {
    /// Run with validated parameters; the caller identity is under `_caller`
    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput>;
}

/// Tool execution statistics
#[derive(Debug, Clone, Default)]
pub struct ToolStats {
    /// Total executions
    pub total_executions: u64,

    /// Successful executions
    pub successful_executions: u64,

    /// Failed executions
    pub failed_executions: u64,

    /// Total execution time (ms)
    pub total_duration_ms: u64,
}

impl ToolStats {
    pub fn record(&mut self, result: &ToolResult) {
        self.total_executions += 1;
        self.total_duration_ms += result.duration_ms;
        if result.success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }
    }

    /// Calculate average duration
    pub fn average_duration_ms(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / self.total_executions as f64
        }
    }

    /// Calculate success rate
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successful_executions as f64 / self.total_executions as f64
        }
    }
}

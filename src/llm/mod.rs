//! LLM and embedding provider interfaces
//!
//! The engine talks to language models only through [`LlmProvider`] and
//! to embedding models through [`EmbeddingProvider`]. Concrete providers:
//! - `ollama`: HTTP client for an Ollama-compatible server
//! - `scripted`: deterministic providers for tests and offline runs

pub mod ollama;
pub mod retry;
pub mod scripted;

pub use ollama::OllamaProvider;
pub use retry::RetryPolicy;
pub use scripted::{HashingEmbedder, ScriptStep, ScriptedProvider};

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role of a provider-level chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    /// Result of a tool call fed back to the model
    Tool,
}

/// Message sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,

    /// Tool calls requested by an assistant message
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Call answered by a tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Function name answered by a tool message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
}

impl ChatMessage {
    fn plain(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            tool_name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(ChatRole::Assistant, content)
    }

    /// Assistant message that requested tool calls
    pub fn assistant_with_calls(content: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::plain(ChatRole::Assistant, content)
        }
    }

    /// Tool result answering a specific call
    pub fn tool(call: &ToolCallRequest, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            ..Self::plain(ChatRole::Tool, content)
        }
    }
}

/// Tool description exposed to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Function name the model uses to request the tool
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters
    pub parameters: serde_json::Value,
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    /// Function name as declared in [`ToolDefinition::name`]
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One provider request
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
    pub temperature: Option<f32>,
}

/// Provider response
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Completion {
    pub content: String,
    pub tool_calls: Vec<ToolCallRequest>,
    /// Prompt plus completion tokens
    pub tokens_used: u64,
    pub finish_reason: Option<String>,
}

impl Completion {
    /// Final answer without tool calls
    pub fn text(content: impl Into<String>, tokens_used: u64) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
            tokens_used,
            finish_reason: Some("stop".to_string()),
        }
    }

    /// Response requesting tool calls
    pub fn with_tool_calls(calls: Vec<ToolCallRequest>, tokens_used: u64) -> Self {
        Self {
            content: String::new(),
            tool_calls: calls,
            tokens_used,
            finish_reason: Some("tool_calls".to_string()),
        }
    }

    pub fn requests_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Chat-completion provider with tool-calling support
#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion>;

    /// Provider name for logs
    fn name(&self) -> &str;
}

/// Text embedding provider
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed dimension of every returned vector
    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

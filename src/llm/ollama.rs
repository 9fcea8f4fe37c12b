//! Ollama API client
//!
//! Implements both provider traits against an Ollama-compatible server:
//! - Chat with tools: POST /api/chat (non-streaming)
//! - Embeddings: POST /api/embed

use crate::errors::{AgentError, Result};
use crate::llm::{
    ChatMessage, ChatRole, Completion, CompletionRequest, EmbeddingProvider, LlmProvider,
    ToolCallRequest, ToolDefinition,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default Ollama API endpoint
pub const DEFAULT_OLLAMA_URL: &str = "http://127.0.0.1:11434";

/// Default chat model
pub const DEFAULT_MODEL: &str = "qwen2.5:7b-instruct";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// Request timeout (60 seconds)
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Ollama chat and embedding client
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    client: Client,
    base_url: String,
    embedding_model: String,
    embedding_dimensions: usize,
}

impl OllamaProvider {
    /// Create a provider for the given server and embedding model
    pub fn with_config(
        base_url: &str,
        embedding_model: &str,
        embedding_dimensions: usize,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            embedding_model: embedding_model.to_string(),
            embedding_dimensions,
        })
    }

    /// Check if the server is reachable
    pub async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/version", self.base_url);

        match self.client.get(&url).send().await {
            Ok(response) => Ok(response.status().is_success()),
            Err(_) => Ok(false),
        }
    }

    /// List available models
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/api/tags", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to list models: {}", e)))?;

        if !response.status().is_success() {
            return Err(AgentError::Provider(
                "Failed to retrieve model list".to_string(),
            ));
        }

        let models_response: ModelsResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse models: {}", e)))?;

        Ok(models_response.models.into_iter().map(|m| m.name).collect())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AgentError::Timeout {
                        duration_ms: REQUEST_TIMEOUT.as_millis() as u64,
                    }
                } else {
                    AgentError::Provider(format!("Failed to send request: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AgentError::Provider(format!("HTTP {}: {}", status, error_text)));
        }

        response
            .json()
            .await
            .map_err(|e| AgentError::Provider(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion> {
        let body = OllamaChatRequest {
            model: request.model.clone(),
            messages: request.messages.iter().map(OllamaMessage::from).collect(),
            tools: request.tools.iter().map(OllamaTool::from).collect(),
            stream: false,
            options: request
                .temperature
                .map(|t| serde_json::json!({ "temperature": t })),
        };

        let response: OllamaChatResponse = self.post("/api/chat", &body).await?;
        let tokens_used = response.prompt_eval_count.unwrap_or(0) + response.eval_count.unwrap_or(0);

        let tool_calls = response
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(i, call)| ToolCallRequest {
                id: call.id.unwrap_or_else(|| format!("call_{}", i)),
                name: call.function.name,
                arguments: call.function.arguments,
            })
            .collect::<Vec<_>>();

        debug!(
            model = %request.model,
            tokens_used,
            tool_calls = tool_calls.len(),
            "chat completion received"
        );

        Ok(Completion {
            content: response.message.content,
            tool_calls,
            tokens_used,
            finish_reason: response.done_reason,
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let body = OllamaEmbedRequest {
            model: self.embedding_model.clone(),
            input: text.to_string(),
        };
        let response: OllamaEmbedResponse = self.post("/api/embed", &body).await?;

        let embedding = response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| AgentError::Provider("embedding response was empty".to_string()))?;

        if embedding.len() != self.embedding_dimensions {
            return Err(AgentError::Validation(format!(
                "embedding model '{}' returned {} dimensions, expected {}",
                self.embedding_model,
                embedding.len(),
                self.embedding_dimensions
            )));
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }

    fn model_id(&self) -> &str {
        &self.embedding_model
    }
}

/// Ollama chat request
#[derive(Debug, Clone, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<OllamaTool>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
struct OllamaMessage {
    role: ChatRole,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
}

impl From<&ChatMessage> for OllamaMessage {
    fn from(msg: &ChatMessage) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
            tool_calls: msg
                .tool_calls
                .iter()
                .map(|c| OllamaToolCall {
                    id: Some(c.id.clone()),
                    function: OllamaFunctionCall {
                        name: c.name.clone(),
                        arguments: c.arguments.clone(),
                    },
                })
                .collect(),
            tool_name: msg.tool_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct OllamaTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ToolDefinition,
}

impl From<&ToolDefinition> for OllamaTool {
    fn from(def: &ToolDefinition) -> Self {
        Self {
            kind: "function",
            function: def.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    function: OllamaFunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct OllamaFunctionCall {
    name: String,
    #[serde(default)]
    arguments: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<OllamaToolCall>>,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: String,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama models list response
#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

/// Model information
#[derive(Debug, Deserialize)]
struct ModelInfo {
    name: String,
}

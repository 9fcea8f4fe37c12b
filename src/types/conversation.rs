//! Conversation, message and citation types
//!
//! A conversation exclusively owns its messages; a message exclusively
//! owns its citations. Messages are append-only and totally ordered by
//! their `position` within the conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::errors::AgentError;

/// How a conversation is driven
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    /// Single-agent chat
    Chat,
    /// Conversation created for a workflow run
    Workflow,
}

impl ConversationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationMode::Chat => "chat",
            ConversationMode::Workflow => "workflow",
        }
    }
}

impl FromStr for ConversationMode {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(ConversationMode::Chat),
            "workflow" => Ok(ConversationMode::Workflow),
            other => Err(AgentError::Validation(format!("unknown conversation mode '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub agent_slug: Option<String>,
    pub folder_id: Option<String>,
    pub title: Option<String>,
    pub mode: ConversationMode,
    /// Sum of the token counts of all messages
    pub total_tokens: u64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a conversation
#[derive(Debug, Clone, PartialEq)]
pub struct NewConversation {
    pub user_id: String,
    pub agent_slug: Option<String>,
    pub folder_id: Option<String>,
    pub title: Option<String>,
    pub mode: ConversationMode,
}

impl NewConversation {
    pub fn chat(user_id: impl Into<String>, agent_slug: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent_slug: Some(agent_slug.into()),
            folder_id: None,
            title: None,
            mode: ConversationMode::Chat,
        }
    }

    pub fn workflow(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            agent_slug: None,
            folder_id: None,
            title: None,
            mode: ConversationMode::Workflow,
        }
    }

    pub fn with_folder(mut self, folder_id: Option<String>) -> Self {
        self.folder_id = folder_id;
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.title = title;
        self
    }
}

/// Message author role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            other => Err(AgentError::Validation(format!("unknown message role '{}'", other))),
        }
    }
}

/// A tool call requested by the model during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub tool_slug: String,
    pub arguments: serde_json::Value,
}

/// The outcome of one tool call, as fed back to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultRecord {
    pub call_id: String,
    pub tool_slug: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Zero-based position within the conversation transcript
    pub position: u64,
    pub role: Role,
    pub content: String,
    pub agent_slug: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_results: Vec<ToolResultRecord>,
    pub tokens: u64,
    pub finish_reason: Option<String>,
    pub citations: Vec<Citation>,
    pub created_at: DateTime<Utc>,
}

/// Parameters for appending a message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewMessage {
    pub role: Option<Role>,
    pub content: String,
    pub agent_slug: Option<String>,
    pub tool_calls: Vec<ToolCallRecord>,
    pub tool_results: Vec<ToolResultRecord>,
    pub tokens: u64,
    pub finish_reason: Option<String>,
    pub citations: Vec<NewCitation>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Some(Role::User),
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn assistant(content: impl Into<String>, agent_slug: impl Into<String>, tokens: u64) -> Self {
        Self {
            role: Some(Role::Assistant),
            content: content.into(),
            agent_slug: Some(agent_slug.into()),
            tokens,
            ..Default::default()
        }
    }

    pub fn system(content: impl Into<String>, tokens: u64) -> Self {
        Self {
            role: Some(Role::System),
            content: content.into(),
            tokens,
            ..Default::default()
        }
    }

    /// Role of the message; a message built without one is a user message
    pub fn role(&self) -> Role {
        self.role.unwrap_or(Role::User)
    }
}

/// A source reference attached to a generated message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub id: Uuid,
    pub message_id: Uuid,
    pub source_type: String,
    pub source_url: Option<String>,
    pub excerpt: String,
    /// Confidence in [0, 1]
    pub confidence_score: f32,
}

/// Citation candidate produced by retrieval, before it is attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCitation {
    pub source_type: String,
    pub source_url: Option<String>,
    pub excerpt: String,
    pub confidence_score: f32,
}

impl NewCitation {
    /// Build a citation, clamping the confidence to [0, 1]
    pub fn new(
        source_type: impl Into<String>,
        source_url: Option<String>,
        excerpt: impl Into<String>,
        confidence_score: f32,
    ) -> Self {
        let confidence_score = if confidence_score.is_nan() {
            0.0
        } else {
            confidence_score.clamp(0.0, 1.0)
        };
        Self {
            source_type: source_type.into(),
            source_url,
            excerpt: excerpt.into(),
            confidence_score,
        }
    }

    /// Attach to a message
    pub fn into_citation(self, message_id: Uuid) -> Citation {
        Citation {
            id: Uuid::new_v4(),
            message_id,
            source_type: self.source_type,
            source_url: self.source_url,
            excerpt: self.excerpt,
            confidence_score: self.confidence_score,
        }
    }

    /// Key used to drop duplicate citations within one message
    pub fn dedup_key(&self) -> (String, Option<String>, String) {
        (self.source_type.clone(), self.source_url.clone(), self.excerpt.clone())
    }
}

//! Conversation store and execution ledger
//!
//! Two persistence interfaces with in-memory and SQLite backends:
//! - [`ConversationStore`]: conversations, their append-only messages and citations
//! - [`ExecutionLedger`]: one row per agent invocation, never deleted or regressed

pub mod memory;
pub mod sqlite;

pub use memory::{InMemoryConversationStore, InMemoryExecutionLedger};
pub use sqlite::{Database, SqliteConversationStore, SqliteExecutionLedger, SqliteKnowledgeStore};

use crate::agent::state::{ExecutionStatus, StatusEvent};
use crate::errors::Result;
use crate::types::{
    AgentExecution, Conversation, ExecutionOutcome, ExecutionStats, Message, NewConversation,
    NewExecution, NewMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use uuid::Uuid;

/// Current time at the microsecond precision every backend stores
pub(crate) fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Build a fresh ledger row in `running` state
pub(crate) fn open_execution(execution: NewExecution) -> Result<AgentExecution> {
    let status = ExecutionStatus::Pending.transition(StatusEvent::Start)?;
    Ok(AgentExecution {
        id: Uuid::new_v4(),
        conversation_id: execution.conversation_id,
        agent_slug: execution.agent_slug,
        workflow_slug: execution.workflow_slug,
        step_index: execution.step_index,
        status,
        input: execution.input,
        output: None,
        tool_calls: Vec::new(),
        tokens_used: 0,
        duration_ms: None,
        error_message: None,
        started_at: now(),
        completed_at: None,
    })
}

/// Apply a terminal outcome through the status state machine
pub(crate) fn close_execution(row: &mut AgentExecution, outcome: ExecutionOutcome) -> Result<()> {
    let event = match outcome {
        ExecutionOutcome::Completed { .. } => StatusEvent::Finish,
        ExecutionOutcome::Failed { .. } => StatusEvent::Fail,
    };
    row.status = row.status.transition(event)?;
    row.completed_at = Some(now().max(row.started_at));

    match outcome {
        ExecutionOutcome::Completed {
            output,
            tool_calls,
            tokens_used,
            duration_ms,
        } => {
            row.output = Some(output);
            row.tool_calls = tool_calls;
            row.tokens_used = tokens_used;
            row.duration_ms = Some(duration_ms);
        }
        ExecutionOutcome::Failed {
            error_message,
            tool_calls,
            tokens_used,
            duration_ms,
        } => {
            row.error_message = Some(error_message);
            row.tool_calls = tool_calls;
            row.tokens_used = tokens_used;
            row.duration_ms = Some(duration_ms);
        }
    }
    Ok(())
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, conversation: NewConversation) -> Result<Conversation>;

    /// Fails with `NotFound` for unknown ids; soft-deleted conversations are returned
    async fn get(&self, id: Uuid) -> Result<Conversation>;

    /// Active conversations of a user, most recently updated first
    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>>;

    /// Mark inactive; messages and executions are kept
    async fn soft_delete(&self, id: Uuid) -> Result<()>;

    /// Append at the next position and add the message tokens to
    /// `total_tokens` in the same atomic step
    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message>;

    /// Full transcript in position order, citations included
    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>>;

    async fn total_tokens(&self, conversation_id: Uuid) -> Result<u64>;
}

/// Filter for ledger listings
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionQuery {
    pub conversation_id: Option<Uuid>,
    pub agent_slug: Option<String>,
    pub limit: Option<usize>,
}

impl ExecutionQuery {
    pub fn conversation(conversation_id: Uuid) -> Self {
        Self {
            conversation_id: Some(conversation_id),
            ..Default::default()
        }
    }

    pub fn agent(agent_slug: impl Into<String>) -> Self {
        Self {
            agent_slug: Some(agent_slug.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, execution: &AgentExecution) -> bool {
        self.conversation_id
            .map_or(true, |id| execution.conversation_id == id)
            && self
                .agent_slug
                .as_deref()
                .map_or(true, |slug| execution.agent_slug == slug)
    }
}

#[async_trait]
pub trait ExecutionLedger: Send + Sync {
    /// Open a row in `running` state
    async fn start(&self, execution: NewExecution) -> Result<AgentExecution>;

    /// Apply the terminal write; a row that is already terminal is rejected
    async fn complete(&self, id: Uuid, outcome: ExecutionOutcome) -> Result<AgentExecution>;

    async fn get(&self, id: Uuid) -> Result<AgentExecution>;

    /// Most recently started first
    async fn list(&self, query: &ExecutionQuery) -> Result<Vec<AgentExecution>>;

    /// Computed from the ledger at call time
    async fn statistics(&self, agent_slug: Option<&str>) -> Result<ExecutionStats>;

    /// Failed rows, most recently started first
    async fn failed_executions(
        &self,
        agent_slug: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AgentExecution>>;
}

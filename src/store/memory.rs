//! In-memory conversation store and execution ledger
//!
//! Each conversation lives in one `DashMap` slot together with its
//! transcript, so appending a message and bumping `total_tokens` happen
//! under the same shard lock.

use crate::errors::{AgentError, Result};
use crate::store::{close_execution, now, open_execution, ConversationStore, ExecutionLedger, ExecutionQuery};
use crate::types::{
    AgentExecution, Conversation, ExecutionOutcome, ExecutionStats, Message, NewConversation,
    NewExecution, NewMessage,
};
use crate::agent::state::ExecutionStatus;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

#[derive(Debug)]
struct ConversationRecord {
    conversation: Conversation,
    messages: Vec<Message>,
}

#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    conversations: DashMap<Uuid, ConversationRecord>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, conversation: NewConversation) -> Result<Conversation> {
        let now = now();
        let created = Conversation {
            id: Uuid::new_v4(),
            user_id: conversation.user_id,
            agent_slug: conversation.agent_slug,
            folder_id: conversation.folder_id,
            title: conversation.title,
            mode: conversation.mode,
            total_tokens: 0,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        self.conversations.insert(
            created.id,
            ConversationRecord {
                conversation: created.clone(),
                messages: Vec::new(),
            },
        );
        Ok(created)
    }

    async fn get(&self, id: Uuid) -> Result<Conversation> {
        self.conversations
            .get(&id)
            .map(|record| record.conversation.clone())
            .ok_or_else(|| AgentError::not_found("Conversation", id.to_string()))
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let mut conversations: Vec<Conversation> = self
            .conversations
            .iter()
            .filter(|r| r.conversation.user_id == user_id && r.conversation.is_active)
            .map(|r| r.conversation.clone())
            .collect();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut record = self
            .conversations
            .get_mut(&id)
            .ok_or_else(|| AgentError::not_found("Conversation", id.to_string()))?;
        record.conversation.is_active = false;
        record.conversation.updated_at = now();
        Ok(())
    }

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        let mut record = self
            .conversations
            .get_mut(&conversation_id)
            .ok_or_else(|| AgentError::not_found("Conversation", conversation_id.to_string()))?;
        if !record.conversation.is_active {
            return Err(AgentError::Validation(format!(
                "conversation {} is deleted",
                conversation_id
            )));
        }

        let id = Uuid::new_v4();
        let now = now();
        let role = message.role();
        let appended = Message {
            id,
            conversation_id,
            position: record.messages.len() as u64,
            role,
            content: message.content,
            agent_slug: message.agent_slug,
            tool_calls: message.tool_calls,
            tool_results: message.tool_results,
            tokens: message.tokens,
            finish_reason: message.finish_reason,
            citations: message
                .citations
                .into_iter()
                .map(|c| c.into_citation(id))
                .collect(),
            created_at: now,
        };

        record.conversation.total_tokens += appended.tokens;
        record.conversation.updated_at = now;
        record.messages.push(appended.clone());
        Ok(appended)
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.conversations
            .get(&conversation_id)
            .map(|record| record.messages.clone())
            .ok_or_else(|| AgentError::not_found("Conversation", conversation_id.to_string()))
    }

    async fn total_tokens(&self, conversation_id: Uuid) -> Result<u64> {
        Ok(self.get(conversation_id).await?.total_tokens)
    }
}

/// Ledger rows tagged with an insertion sequence for stable ordering
#[derive(Debug, Default)]
pub struct InMemoryExecutionLedger {
    rows: DashMap<Uuid, (u64, AgentExecution)>,
    sequence: AtomicU64,
}

impl InMemoryExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Matching rows, most recently started first
    fn collect(&self, filter: impl Fn(&AgentExecution) -> bool) -> Vec<AgentExecution> {
        let mut rows: Vec<(u64, AgentExecution)> = self
            .rows
            .iter()
            .filter(|r| filter(&r.value().1))
            .map(|r| r.value().clone())
            .collect();
        rows.sort_by(|(seq_a, a), (seq_b, b)| {
            b.started_at.cmp(&a.started_at).then(seq_b.cmp(seq_a))
        });
        rows.into_iter().map(|(_, row)| row).collect()
    }
}

#[async_trait]
impl ExecutionLedger for InMemoryExecutionLedger {
    async fn start(&self, execution: NewExecution) -> Result<AgentExecution> {
        let row = open_execution(execution)?;
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.rows.insert(row.id, (seq, row.clone()));
        Ok(row)
    }

    async fn complete(&self, id: Uuid, outcome: ExecutionOutcome) -> Result<AgentExecution> {
        let mut slot = self
            .rows
            .get_mut(&id)
            .ok_or_else(|| AgentError::not_found("Execution", id.to_string()))?;
        let row = &mut slot.value_mut().1;
        close_execution(row, outcome)?;
        Ok(row.clone())
    }

    async fn get(&self, id: Uuid) -> Result<AgentExecution> {
        self.rows
            .get(&id)
            .map(|slot| slot.value().1.clone())
            .ok_or_else(|| AgentError::not_found("Execution", id.to_string()))
    }

    async fn list(&self, query: &ExecutionQuery) -> Result<Vec<AgentExecution>> {
        let mut rows = self.collect(|row| query.matches(row));
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }

    async fn statistics(&self, agent_slug: Option<&str>) -> Result<ExecutionStats> {
        let rows = self.collect(|row| agent_slug.map_or(true, |slug| row.agent_slug == slug));
        Ok(ExecutionStats::from_executions(&rows))
    }

    async fn failed_executions(
        &self,
        agent_slug: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AgentExecution>> {
        let mut rows = self.collect(|row| {
            row.status == ExecutionStatus::Failed
                && agent_slug.map_or(true, |slug| row.agent_slug == slug)
        });
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        Ok(rows)
    }
}

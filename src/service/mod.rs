//! Caller-facing operations
//!
//! [`AgentService`] is the surface a transport layer calls: chat turns
//! (plain or streaming), workflow runs, catalog listings, conversation
//! access and ledger queries. Runs on the same conversation are serialized
//! by a per-conversation gate; runs on different conversations proceed in
//! parallel.

pub mod builder;

pub use builder::{Engine, ServiceBuilder};

use crate::agent::{
    AgentExecutor, CancelHandle, CancelToken, EventSink, TurnEvent, TurnRequest,
    EVENT_CHANNEL_CAPACITY,
};
use crate::catalog::AgentCatalog;
use crate::errors::{AgentError, Result};
use crate::store::ExecutionQuery;
use crate::types::{
    Agent, AgentExecution, Conversation, ExecutionStats, Message, NewConversation, TurnOutcome,
    Workflow, WorkflowRunResult,
};
use crate::workflow::{WorkflowEngine, WorkflowRequest};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

/// Characters of the first message used as a conversation title
const TITLE_CHARS: usize = 60;

/// A chat message from a user to an agent
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub user_id: String,
    pub agent_slug: String,
    pub message: String,
    /// Continue this conversation; a new one is created when absent
    pub conversation_id: Option<Uuid>,
    pub folder_id: Option<String>,
}

impl ChatRequest {
    pub fn new(
        user_id: impl Into<String>,
        agent_slug: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            agent_slug: agent_slug.into(),
            message: message.into(),
            conversation_id: None,
            folder_id: None,
        }
    }

    pub fn in_conversation(mut self, conversation_id: Uuid) -> Self {
        self.conversation_id = Some(conversation_id);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatResponse {
    pub conversation_id: Uuid,
    pub outcome: TurnOutcome,
}

/// A conversation with its transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub messages: Vec<Message>,
}

/// A turn running in the background
pub struct TurnStream {
    pub conversation_id: Uuid,
    pub events: mpsc::Receiver<TurnEvent>,
    cancel: CancelHandle,
    task: JoinHandle<Result<ChatResponse>>,
}

impl TurnStream {
    /// Ask the running turn to stop; it still records a failed execution
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the turn result
    pub async fn finish(self) -> Result<ChatResponse> {
        self.task
            .await
            .map_err(|e| AgentError::Generic(format!("turn task failed: {}", e)))?
    }
}

#[derive(Clone)]
pub struct AgentService {
    catalog: Arc<AgentCatalog>,
    executor: AgentExecutor,
    workflows: WorkflowEngine,
    gates: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl AgentService {
    pub fn new(catalog: Arc<AgentCatalog>, executor: AgentExecutor) -> Self {
        let workflows = WorkflowEngine::new(executor.clone(), catalog.clone());
        Self {
            catalog,
            executor,
            workflows,
            gates: Arc::new(DashMap::new()),
        }
    }

    pub fn catalog(&self) -> &AgentCatalog {
        &self.catalog
    }

    pub fn list_agents(&self) -> Vec<Agent> {
        self.catalog.list_agents().into_iter().cloned().collect()
    }

    pub fn list_workflows(&self) -> Vec<Workflow> {
        self.catalog.list_workflows().into_iter().cloned().collect()
    }

    /// Run one chat turn and wait for the answer
    pub async fn send_message(&self, request: ChatRequest) -> Result<ChatResponse> {
        let (agent, conversation_id) = self.prepare_chat(&request).await?;
        self.run_chat(agent, conversation_id, request, &EventSink::disabled(), CancelToken::never())
            .await
    }

    /// Start a chat turn in the background and stream its events
    pub async fn send_message_streaming(&self, request: ChatRequest) -> Result<TurnStream> {
        let (agent, conversation_id) = self.prepare_chat(&request).await?;
        let (sink, events) = EventSink::channel(EVENT_CHANNEL_CAPACITY);
        let (cancel, token) = CancelHandle::pair();

        let service = self.clone();
        let task = tokio::spawn(async move {
            service
                .run_chat(agent, conversation_id, request, &sink, token)
                .await
        });

        Ok(TurnStream {
            conversation_id,
            events,
            cancel,
            task,
        })
    }

    pub async fn execute_workflow(&self, request: WorkflowRequest) -> Result<WorkflowRunResult> {
        let gate = match request.conversation_id {
            Some(id) => Some(self.lock_conversation(id).await),
            None => None,
        };
        let result = self.workflows.run(request).await;
        if let Some(gate) = gate {
            self.release(gate);
        }
        result
    }

    /// Active conversations of a user, most recently updated first
    pub async fn list_conversations(&self, user_id: &str) -> Result<Vec<Conversation>> {
        self.executor.conversations().list_by_user(user_id).await
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<ConversationView> {
        let conversations = self.executor.conversations();
        let conversation = conversations.get(id).await?;
        if !conversation.is_active {
            return Err(AgentError::not_found("Conversation", id.to_string()));
        }
        let messages = conversations.list_messages(id).await?;
        Ok(ConversationView {
            conversation,
            messages,
        })
    }

    /// Soft delete; the transcript and executions stay as audit trail
    pub async fn delete_conversation(&self, id: Uuid, user_id: &str) -> Result<()> {
        let conversations = self.executor.conversations();
        let conversation = conversations.get(id).await?;
        if conversation.user_id != user_id {
            return Err(AgentError::Permission(format!(
                "conversation {} belongs to another user",
                id
            )));
        }
        let gate = self.lock_conversation(id).await;
        let result = conversations.soft_delete(id).await;
        self.release(gate);
        result?;
        info!(conversation_id = %id, "conversation deleted");
        Ok(())
    }

    pub async fn executions(&self, query: &ExecutionQuery) -> Result<Vec<AgentExecution>> {
        self.executor.ledger().list(query).await
    }

    pub async fn statistics(&self, agent_slug: Option<&str>) -> Result<ExecutionStats> {
        self.executor.ledger().statistics(agent_slug).await
    }

    pub async fn failed_executions(
        &self,
        agent_slug: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AgentExecution>> {
        self.executor.ledger().failed_executions(agent_slug, limit).await
    }

    /// Resolve the agent and the target conversation, creating it if needed
    async fn prepare_chat(&self, request: &ChatRequest) -> Result<(Agent, Uuid)> {
        let agent = self.catalog.agent(&request.agent_slug)?.clone();
        if request.message.trim().is_empty() {
            return Err(AgentError::Validation("message is empty".to_string()));
        }

        let conversations = self.executor.conversations();
        let conversation_id = match request.conversation_id {
            Some(id) => {
                let conversation = conversations.get(id).await?;
                if !conversation.is_active {
                    return Err(AgentError::not_found("Conversation", id.to_string()));
                }
                if conversation.user_id != request.user_id {
                    return Err(AgentError::Permission(format!(
                        "conversation {} belongs to another user",
                        id
                    )));
                }
                id
            }
            None => {
                let title: String = request.message.chars().take(TITLE_CHARS).collect();
                conversations
                    .create(
                        NewConversation::chat(&request.user_id, &agent.slug)
                            .with_folder(request.folder_id.clone())
                            .with_title(Some(title)),
                    )
                    .await?
                    .id
            }
        };
        Ok((agent, conversation_id))
    }

    async fn run_chat(
        &self,
        agent: Agent,
        conversation_id: Uuid,
        request: ChatRequest,
        events: &EventSink,
        cancel: CancelToken,
    ) -> Result<ChatResponse> {
        let gate = self.lock_conversation(conversation_id).await;
        let turn = TurnRequest::chat(conversation_id, Some(request.user_id), request.message);
        let result = self.executor.run(&agent, turn, events, cancel).await;
        self.release(gate);

        result.map(|outcome| ChatResponse {
            conversation_id,
            outcome,
        })
    }

    async fn lock_conversation(&self, id: Uuid) -> ConversationGate {
        let mutex = self
            .gates
            .entry(id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        debug!(conversation_id = %id, "waiting for conversation gate");
        ConversationGate {
            id,
            _guard: mutex.lock_owned().await,
        }
    }

    /// Drop the guard and forget the gate if nobody else holds it
    fn release(&self, gate: ConversationGate) {
        let id = gate.id;
        drop(gate);
        self.gates.remove_if(&id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

struct ConversationGate {
    id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

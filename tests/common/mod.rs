//! Shared fixtures for the integration tests
//!
//! Builds the engine from in-memory parts: a scripted provider, hashed
//! embeddings, the built-in catalog and the legal tool set.

#![allow(dead_code)]

use lexflow::agent::{AgentExecutor, ExecutorConfig};
use lexflow::budget::TurnBudget;
use lexflow::catalog::AgentCatalog;
use lexflow::knowledge::{InMemoryKnowledgeStore, KnowledgeStore};
use lexflow::llm::{
    Completion, HashingEmbedder, RetryPolicy, ScriptStep, ScriptedProvider, ToolCallRequest,
};
use lexflow::rag::{RagRetriever, RetrievalConfig};
use lexflow::store::{
    ConversationStore, ExecutionLedger, InMemoryConversationStore, InMemoryExecutionLedger,
};
use lexflow::tools::implementations::{ClientRecord, InMemoryClientDirectory};
use lexflow::tools::{register_builtin_tools, BuiltinTools, ToolInvoker, ToolRegistry};
use lexflow::types::{NewConversation, NewKnowledgeEntry};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const DIMENSIONS: usize = 64;
pub const USER: &str = "advogada-1";

pub struct Harness {
    pub provider: Arc<ScriptedProvider>,
    pub embedder: Arc<HashingEmbedder>,
    pub knowledge: Arc<InMemoryKnowledgeStore>,
    pub conversations: Arc<InMemoryConversationStore>,
    pub ledger: Arc<InMemoryExecutionLedger>,
    pub clients: Arc<InMemoryClientDirectory>,
    pub retriever: RagRetriever,
    pub invoker: ToolInvoker,
    pub catalog: Arc<AgentCatalog>,
    pub executor: AgentExecutor,
}

/// Executor defaults for tests: no retry, generous budget
pub fn test_config() -> ExecutorConfig {
    ExecutorConfig {
        budget: TurnBudget::new(5, Duration::from_secs(10)),
        provider_call_timeout: Duration::from_secs(5),
        retry: RetryPolicy::no_retry(),
        ..ExecutorConfig::default()
    }
}

impl Harness {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self::with_config(steps, test_config())
    }

    pub fn with_config(steps: Vec<ScriptStep>, config: ExecutorConfig) -> Self {
        let provider = Arc::new(ScriptedProvider::new(steps));
        let embedder = Arc::new(HashingEmbedder::new(DIMENSIONS));
        let knowledge = Arc::new(InMemoryKnowledgeStore::new(DIMENSIONS));
        let conversations = Arc::new(InMemoryConversationStore::new());
        let ledger = Arc::new(InMemoryExecutionLedger::new());
        let clients = Arc::new(InMemoryClientDirectory::new());

        let retriever = RagRetriever::with_config(
            knowledge.clone(),
            embedder.clone(),
            RetrievalConfig {
                min_confidence: 10.0,
                ..RetrievalConfig::default()
            },
            RetryPolicy::no_retry(),
        );

        let mut registry = ToolRegistry::new();
        register_builtin_tools(
            &mut registry,
            BuiltinTools {
                retriever: retriever.clone(),
                clients: clients.clone(),
                documents: None,
            },
        )
        .expect("builtin tools register");
        let invoker = ToolInvoker::new(Arc::new(registry));

        let executor = AgentExecutor::new(
            provider.clone(),
            invoker.clone(),
            conversations.clone(),
            ledger.clone(),
        )
        .with_retriever(retriever.clone())
        .with_config(config);

        Self {
            provider,
            embedder,
            knowledge,
            conversations,
            ledger,
            clients,
            retriever,
            invoker,
            catalog: Arc::new(AgentCatalog::builtin()),
            executor,
        }
    }

    /// Store an embedded knowledge entry
    pub async fn seed(&self, source_type: &str, title: &str, content: &str) -> i64 {
        let entry = NewKnowledgeEntry::new(source_type, content)
            .with_title(title)
            .with_url(format!("https://lex.example/{}", title.to_lowercase().replace(' ', "-")))
            .with_embedding(self.embedder.embed_text(content));
        self.knowledge.insert(entry).await.expect("seed entry").id
    }

    pub fn add_client(&self, id: &str, owner: &str) {
        self.clients.insert(ClientRecord {
            id: id.to_string(),
            owner_user_id: owner.to_string(),
            name: "Maria Souza".to_string(),
            document: Some("123.456.789-00".to_string()),
            email: None,
            phone: None,
            notes: None,
        });
    }

    pub async fn chat_conversation(&self, agent_slug: &str) -> Uuid {
        self.conversations
            .create(NewConversation::chat(USER, agent_slug))
            .await
            .expect("create conversation")
            .id
    }

    /// Sum of `tokens_used` over every execution of a conversation
    pub async fn ledger_tokens(&self, conversation_id: Uuid) -> u64 {
        self.ledger
            .list(&lexflow::store::ExecutionQuery::conversation(conversation_id))
            .await
            .expect("list executions")
            .iter()
            .map(|e| e.tokens_used)
            .sum()
    }
}

pub fn reply(content: &str, tokens: u64) -> ScriptStep {
    ScriptStep::Reply(Completion::text(content, tokens))
}

pub fn tool_call(id: &str, name: &str, arguments: serde_json::Value, tokens: u64) -> ScriptStep {
    ScriptStep::Reply(Completion::with_tool_calls(
        vec![ToolCallRequest {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }],
        tokens,
    ))
}

pub fn search(id: &str, query: &str, tokens: u64) -> ScriptStep {
    tool_call(id, "search_legislation", json!({ "query": query }), tokens)
}

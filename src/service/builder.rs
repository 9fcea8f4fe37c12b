//! Wiring of the engine from configuration
//!
//! Collaborators not given explicitly are derived from [`Config`]:
//! the Ollama provider for chat and embeddings, and the configured storage
//! backend for conversations, executions and knowledge.

use crate::agent::AgentExecutor;
use crate::config::{Config, StorageBackend};
use crate::errors::Result;
use crate::knowledge::{IngestionWorker, InMemoryKnowledgeStore, KnowledgeStore};
use crate::llm::{EmbeddingProvider, LlmProvider, OllamaProvider};
use crate::rag::RagRetriever;
use crate::service::AgentService;
use crate::store::{
    ConversationStore, Database, ExecutionLedger, InMemoryConversationStore,
    InMemoryExecutionLedger, SqliteConversationStore, SqliteExecutionLedger, SqliteKnowledgeStore,
};
use crate::tools::implementations::{ClientDirectory, DocumentExtractor, InMemoryClientDirectory};
use crate::tools::{register_builtin_tools, BuiltinTools, ToolInvoker, ToolRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// The assembled engine
pub struct Engine {
    pub service: AgentService,
    pub knowledge: Arc<dyn KnowledgeStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub config: Config,
}

impl Engine {
    /// Ingestion worker over this engine's knowledge store
    pub fn ingestion_worker(&self) -> IngestionWorker {
        IngestionWorker::new(
            self.knowledge.clone(),
            self.embedder.clone(),
            self.config.retry_policy(),
        )
    }
}

pub struct ServiceBuilder {
    config: Config,
    provider: Option<Arc<dyn LlmProvider>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    clients: Option<Arc<dyn ClientDirectory>>,
    documents: Option<Arc<dyn DocumentExtractor>>,
    knowledge: Option<Arc<dyn KnowledgeStore>>,
}

impl ServiceBuilder {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            provider: None,
            embedder: None,
            clients: None,
            documents: None,
            knowledge: None,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_clients(mut self, clients: Arc<dyn ClientDirectory>) -> Self {
        self.clients = Some(clients);
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentExtractor>) -> Self {
        self.documents = Some(documents);
        self
    }

    /// Use this knowledge store instead of the configured backend
    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeStore>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn build(self) -> Result<Engine> {
        let config = self.config;
        config.validate()?;
        let catalog = Arc::new(config.catalog()?);

        let (provider, embedder) = match (self.provider, self.embedder) {
            (Some(provider), Some(embedder)) => (provider, embedder),
            (provider, embedder) => {
                let ollama = Arc::new(OllamaProvider::with_config(
                    &config.provider_url(),
                    &config.provider.embedding_model,
                    config.provider.embedding_dimensions,
                    Some(Duration::from_secs(config.provider.request_timeout_secs)),
                )?);
                (
                    provider.unwrap_or_else(|| ollama.clone() as Arc<dyn LlmProvider>),
                    embedder.unwrap_or(ollama as Arc<dyn EmbeddingProvider>),
                )
            }
        };
        let dimensions = embedder.dimensions();

        let (conversations, ledger, knowledge): (
            Arc<dyn ConversationStore>,
            Arc<dyn ExecutionLedger>,
            Arc<dyn KnowledgeStore>,
        ) = match config.storage.backend {
            StorageBackend::Memory => (
                Arc::new(InMemoryConversationStore::new()),
                Arc::new(InMemoryExecutionLedger::new()),
                self.knowledge.unwrap_or_else(|| {
                    Arc::new(InMemoryKnowledgeStore::new(dimensions)) as Arc<dyn KnowledgeStore>
                }),
            ),
            StorageBackend::Sqlite => {
                let db = Database::open(&config.database_path())?;
                (
                    Arc::new(SqliteConversationStore::new(db.clone())),
                    Arc::new(SqliteExecutionLedger::new(db.clone())),
                    self.knowledge.unwrap_or_else(|| {
                        Arc::new(SqliteKnowledgeStore::new(db, dimensions)) as Arc<dyn KnowledgeStore>
                    }),
                )
            }
        };

        let retriever = RagRetriever::with_config(
            knowledge.clone(),
            embedder.clone(),
            config.retrieval_config(),
            config.retry_policy(),
        );

        let mut registry = ToolRegistry::new();
        register_builtin_tools(
            &mut registry,
            BuiltinTools {
                retriever: retriever.clone(),
                clients: self.clients.unwrap_or_else(|| {
                    Arc::new(InMemoryClientDirectory::new()) as Arc<dyn ClientDirectory>
                }),
                documents: self.documents,
            },
        )?;
        let invoker = ToolInvoker::with_config(
            Arc::new(registry),
            config.tools.max_parallel,
            Duration::from_secs(config.tools.call_timeout_secs),
        );

        let executor = AgentExecutor::new(provider.clone(), invoker, conversations, ledger)
            .with_retriever(retriever)
            .with_config(config.executor_config());

        info!(
            provider = provider.name(),
            embedding_model = embedder.model_id(),
            dimensions,
            backend = ?config.storage.backend,
            agents = catalog.list_agents().len(),
            workflows = catalog.list_workflows().len(),
            "engine assembled"
        );

        Ok(Engine {
            service: AgentService::new(catalog, executor),
            knowledge,
            embedder,
            config,
        })
    }
}

//! Background ingestion worker
//!
//! Runs outside the synchronous turn path: documents submitted through an
//! [`IngestionHandle`] are embedded and inserted by a tokio task. A backfill
//! pass embeds entries that were stored without an embedding.

use crate::errors::{AgentError, Result};
use crate::knowledge::KnowledgeStore;
use crate::llm::{EmbeddingProvider, RetryPolicy};
use crate::types::{KnowledgeEntry, NewKnowledgeEntry};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Queue capacity of the worker
const QUEUE_CAPACITY: usize = 256;

/// Commands accepted by the worker
enum IngestCommand {
    Ingest {
        entry: NewKnowledgeEntry,
        reply: Option<oneshot::Sender<Result<KnowledgeEntry>>>,
    },
    Backfill {
        batch_size: usize,
        reply: oneshot::Sender<Result<usize>>,
    },
}

/// Embeds and stores knowledge entries
pub struct IngestionWorker {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
}

impl IngestionWorker {
    pub fn new(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            embedder,
            retry,
        }
    }

    /// Embed (unless already embedded) and insert one entry
    pub async fn ingest(&self, mut entry: NewKnowledgeEntry) -> Result<KnowledgeEntry> {
        if entry.content.trim().is_empty() {
            return Err(AgentError::Validation(
                "knowledge entry content is empty".to_string(),
            ));
        }
        if entry.embedding.is_none() {
            entry.embedding = Some(self.embed(&entry.content).await?);
        }
        let stored = self.store.insert(entry).await?;
        debug!(id = stored.id, source_type = %stored.source_type, "knowledge entry ingested");
        Ok(stored)
    }

    /// Embed entries stored without an embedding; returns how many were updated
    ///
    /// Entries whose embedding fails are logged and skipped.
    pub async fn backfill(&self, batch_size: usize) -> Result<usize> {
        let pending = self.store.list_unembedded(batch_size).await?;
        let mut updated = 0;

        for mut entry in pending {
            match self.embed(&entry.content).await {
                Ok(embedding) => {
                    entry.embedding = Some(embedding);
                    self.store.update(entry).await?;
                    updated += 1;
                }
                Err(e) => warn!(id = entry.id, error = %e, "backfill embedding failed"),
            }
        }

        info!(updated, "knowledge backfill finished");
        Ok(updated)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let embedder = self.embedder.clone();
        self.retry
            .execute_with_retry("embed", || {
                let embedder = embedder.clone();
                async move { embedder.embed(text).await }
            })
            .await
    }

    /// Move the worker onto a tokio task
    pub fn spawn(self) -> IngestionHandle {
        let (sender, receiver) = mpsc::channel(QUEUE_CAPACITY);
        let task = tokio::spawn(self.run(receiver));
        info!("knowledge ingestion worker started");
        IngestionHandle { sender, task }
    }

    async fn run(self, mut receiver: mpsc::Receiver<IngestCommand>) {
        while let Some(command) = receiver.recv().await {
            match command {
                IngestCommand::Ingest { entry, reply } => {
                    let result = self.ingest(entry).await;
                    if let Err(e) = &result {
                        error!(error = %e, "knowledge ingestion failed");
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                IngestCommand::Backfill { batch_size, reply } => {
                    let _ = reply.send(self.backfill(batch_size).await);
                }
            }
        }
        info!("knowledge ingestion worker shutting down");
    }
}

/// Producer side of a running worker
pub struct IngestionHandle {
    sender: mpsc::Sender<IngestCommand>,
    task: JoinHandle<()>,
}

impl IngestionHandle {
    /// Queue an entry without waiting for it to be stored
    pub async fn submit(&self, entry: NewKnowledgeEntry) -> Result<()> {
        self.send(IngestCommand::Ingest { entry, reply: None }).await
    }

    /// Queue an entry and wait for the stored result
    pub async fn ingest(&self, entry: NewKnowledgeEntry) -> Result<KnowledgeEntry> {
        let (reply, receiver) = oneshot::channel();
        self.send(IngestCommand::Ingest {
            entry,
            reply: Some(reply),
        })
        .await?;
        receiver.await.map_err(|_| worker_gone())?
    }

    pub async fn backfill(&self, batch_size: usize) -> Result<usize> {
        let (reply, receiver) = oneshot::channel();
        self.send(IngestCommand::Backfill { batch_size, reply }).await?;
        receiver.await.map_err(|_| worker_gone())?
    }

    /// Close the queue and wait until every queued entry is processed
    pub async fn shutdown(self) -> Result<()> {
        drop(self.sender);
        self.task
            .await
            .map_err(|e| AgentError::Generic(format!("ingestion worker panicked: {}", e)))
    }

    async fn send(&self, command: IngestCommand) -> Result<()> {
        self.sender.send(command).await.map_err(|_| worker_gone())
    }
}

fn worker_gone() -> AgentError {
    AgentError::Generic("ingestion worker is not running".to_string())
}

//! Knowledge store
//!
//! Persists content chunks with optional embeddings and answers vector
//! similarity queries. Reads never block on writers: the in-memory store
//! scans an immutable snapshot, the SQLite store reads through WAL.

pub mod ingestion;
pub mod memory;
pub mod similarity;

pub use ingestion::{IngestionHandle, IngestionWorker};
pub use memory::InMemoryKnowledgeStore;

use crate::errors::{AgentError, Result};
use crate::types::{KnowledgeEntry, NewKnowledgeEntry, ScoredEntry, SearchFilter};
use async_trait::async_trait;

#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    async fn insert(&self, entry: NewKnowledgeEntry) -> Result<KnowledgeEntry>;

    async fn find(&self, id: i64) -> Result<Option<KnowledgeEntry>>;

    /// Replace the stored entry with the same id
    async fn update(&self, entry: KnowledgeEntry) -> Result<KnowledgeEntry>;

    /// Up to `limit` embedded entries nearest to `embedding`, ascending
    /// distance, ties broken by entry id
    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>>;

    /// Entries still waiting for an embedding, oldest first
    async fn list_unembedded(&self, limit: usize) -> Result<Vec<KnowledgeEntry>>;

    async fn count(&self) -> Result<usize>;

    /// Dimension every stored embedding must have
    fn dimensions(&self) -> usize;
}

/// Reject vectors whose length differs from the store dimension
pub(crate) fn check_dimensions(expected: usize, embedding: &[f32]) -> Result<()> {
    if embedding.len() != expected {
        return Err(AgentError::Validation(format!(
            "embedding has {} dimensions, store expects {}",
            embedding.len(),
            expected
        )));
    }
    if embedding.iter().any(|v| !v.is_finite()) {
        return Err(AgentError::Validation(
            "embedding contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

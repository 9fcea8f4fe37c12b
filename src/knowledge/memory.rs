//! In-memory knowledge store with snapshot reads

use crate::errors::{AgentError, Result};
use crate::knowledge::{check_dimensions, similarity, KnowledgeStore};
use crate::types::{KnowledgeEntry, NewKnowledgeEntry, ScoredEntry, SearchFilter};
use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// Copy-on-write entry list; a similarity scan holds one immutable snapshot
#[derive(Debug)]
pub struct InMemoryKnowledgeStore {
    entries: ArcSwap<Vec<Arc<KnowledgeEntry>>>,
    next_id: AtomicI64,
    dimensions: usize,
}

impl InMemoryKnowledgeStore {
    pub fn new(dimensions: usize) -> Self {
        Self {
            entries: ArcSwap::from_pointee(Vec::new()),
            next_id: AtomicI64::new(1),
            dimensions,
        }
    }
}

#[async_trait]
impl KnowledgeStore for InMemoryKnowledgeStore {
    async fn insert(&self, entry: NewKnowledgeEntry) -> Result<KnowledgeEntry> {
        if let Some(embedding) = &entry.embedding {
            check_dimensions(self.dimensions, embedding)?;
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let stored = Arc::new(entry.into_entry(id, Utc::now()));

        self.entries.rcu(|current| {
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(stored.clone());
            next
        });
        Ok((*stored).clone())
    }

    async fn find(&self, id: i64) -> Result<Option<KnowledgeEntry>> {
        Ok(self
            .entries
            .load()
            .iter()
            .find(|e| e.id == id)
            .map(|e| (**e).clone()))
    }

    async fn update(&self, entry: KnowledgeEntry) -> Result<KnowledgeEntry> {
        if let Some(embedding) = &entry.embedding {
            check_dimensions(self.dimensions, embedding)?;
        }
        if !self.entries.load().iter().any(|e| e.id == entry.id) {
            return Err(AgentError::not_found("KnowledgeEntry", entry.id.to_string()));
        }

        let replacement = Arc::new(entry);
        self.entries.rcu(|current| {
            current
                .iter()
                .map(|e| {
                    if e.id == replacement.id {
                        replacement.clone()
                    } else {
                        e.clone()
                    }
                })
                .collect::<Vec<_>>()
        });
        Ok((*replacement).clone())
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>> {
        check_dimensions(self.dimensions, embedding)?;
        let snapshot = self.entries.load_full();
        Ok(similarity::rank(
            embedding,
            snapshot.iter().map(|e| e.as_ref()).filter(|e| filter.matches(e)),
            limit,
        ))
    }

    async fn list_unembedded(&self, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        Ok(self
            .entries
            .load()
            .iter()
            .filter(|e| !e.is_embedded())
            .take(limit)
            .map(|e| (**e).clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.load().len())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

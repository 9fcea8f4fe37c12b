//! RAG retriever
//!
//! Embeds a query, asks the knowledge store for the nearest entries and
//! turns them into ranked sources, a bounded context summary and
//! citation candidates.

use crate::errors::{AgentError, Result};
use crate::knowledge::similarity::compare_scored;
use crate::knowledge::KnowledgeStore;
use crate::llm::{EmbeddingProvider, RetryPolicy};
use crate::rag::context::{truncate_chars, ContextBuilder, ContextConfig};
use crate::types::{NewCitation, ScoredEntry, SearchFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Maximum characters of a source copied into a citation excerpt
const EXCERPT_CHARS: usize = 280;

/// Retrieval parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of sources (default: 5)
    pub top_k: usize,
    /// Minimum confidence in [0, 100] (default: 30)
    pub min_confidence: f32,
    /// Token budget of the context summary
    pub context_token_budget: usize,
    /// Timeout of each embedding and store call
    #[serde(skip, default = "default_call_timeout")]
    pub call_timeout: Duration,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_confidence: 30.0,
            context_token_budget: 1500,
            call_timeout: default_call_timeout(),
        }
    }
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(15)
}

/// A retained knowledge entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSource {
    pub entry_id: i64,
    pub source_type: String,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub content: String,
    pub distance: f32,
    /// `(1 - distance) * 100`, clamped to [0, 100]
    pub confidence: f32,
}

impl RetrievedSource {
    fn from_scored(scored: ScoredEntry) -> Self {
        Self {
            confidence: confidence_from_distance(scored.distance),
            distance: scored.distance,
            entry_id: scored.entry.id,
            source_type: scored.entry.source_type,
            source_url: scored.entry.source_url,
            title: scored.entry.title,
            content: scored.entry.content,
        }
    }

    /// Citation candidate with confidence scaled to [0, 1]
    pub fn citation(&self) -> NewCitation {
        NewCitation::new(
            self.source_type.clone(),
            self.source_url.clone(),
            truncate_chars(&self.content, EXCERPT_CHARS),
            self.confidence / 100.0,
        )
    }
}

/// Sources plus the context summary assembled from them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// Ascending distance, ties broken by entry id
    pub sources: Vec<RetrievedSource>,
    pub context_summary: String,
}

impl RetrievalResult {
    pub fn citations(&self) -> Vec<NewCitation> {
        self.sources.iter().map(RetrievedSource::citation).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Map a cosine distance to a confidence percentage
pub fn confidence_from_distance(distance: f32) -> f32 {
    if distance.is_nan() {
        return 0.0;
    }
    ((1.0 - distance) * 100.0).clamp(0.0, 100.0)
}

/// Retrieval over a knowledge store
#[derive(Clone)]
pub struct RagRetriever {
    store: Arc<dyn KnowledgeStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    context_builder: ContextBuilder,
    config: RetrievalConfig,
}

impl RagRetriever {
    pub fn new(store: Arc<dyn KnowledgeStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_config(store, embedder, RetrievalConfig::default(), RetryPolicy::new())
    }

    pub fn with_config(
        store: Arc<dyn KnowledgeStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RetrievalConfig,
        retry: RetryPolicy,
    ) -> Self {
        let context_builder = ContextBuilder::with_config(ContextConfig {
            max_context_tokens: config.context_token_budget,
            include_metadata: true,
        });
        Self {
            store,
            embedder,
            retry,
            context_builder,
            config,
        }
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Retrieve up to `top_k` sources for `query`
    ///
    /// Never pads: a store holding fewer matching entries yields fewer sources.
    pub async fn retrieve(
        &self,
        query: &str,
        filter: &SearchFilter,
        top_k: usize,
    ) -> Result<RetrievalResult> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AgentError::Validation("retrieval query is empty".to_string()));
        }
        if top_k == 0 {
            return Ok(RetrievalResult::default());
        }

        let start = Instant::now();
        let embedding = self.embed_query(query).await?;
        let timeout = self.config.call_timeout;

        let scored = tokio::time::timeout(
            timeout,
            self.store.similarity_search(&embedding, top_k, filter),
        )
        .await
        .map_err(|_| AgentError::Timeout {
            duration_ms: timeout.as_millis() as u64,
        })??;
        let candidates = scored.len();

        let mut scored = scored;
        scored.sort_by(compare_scored);
        let sources: Vec<RetrievedSource> = scored
            .into_iter()
            .take(top_k)
            .map(RetrievedSource::from_scored)
            .filter(|s| s.confidence >= self.config.min_confidence)
            .collect();

        let context = self.context_builder.build(&sources);

        info!(
            candidates,
            retained = sources.len(),
            top_k,
            source_type = filter.source_type.as_deref().unwrap_or("any"),
            duration_ms = start.elapsed().as_millis() as u64,
            "retrieval finished"
        );

        Ok(RetrievalResult {
            sources,
            context_summary: context.text,
        })
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>> {
        let timeout = self.config.call_timeout;
        let embedding = self
            .retry
            .execute_with_retry("embed_query", || async {
                tokio::time::timeout(timeout, self.embedder.embed(query))
                    .await
                    .map_err(|_| AgentError::Timeout {
                        duration_ms: timeout.as_millis() as u64,
                    })?
            })
            .await?;

        if embedding.len() != self.store.dimensions() {
            return Err(AgentError::Validation(format!(
                "embedding model '{}' produces {} dimensions, knowledge store expects {}",
                self.embedder.model_id(),
                embedding.len(),
                self.store.dimensions()
            )));
        }
        debug!(dimensions = embedding.len(), "query embedded");
        Ok(embedding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::InMemoryKnowledgeStore;
    use crate::llm::HashingEmbedder;
    use crate::types::NewKnowledgeEntry;

    const DIMS: usize = 64;

    async fn retriever_with(entries: &[(&str, &str)], min_confidence: f32) -> RagRetriever {
        let embedder = HashingEmbedder::new(DIMS);
        let store = Arc::new(InMemoryKnowledgeStore::new(DIMS));
        for (source_type, content) in entries {
            store
                .insert(
                    NewKnowledgeEntry::new(*source_type, *content)
                        .with_embedding(embedder.embed_text(content)),
                )
                .await
                .unwrap();
        }
        RagRetriever::with_config(
            store,
            Arc::new(embedder),
            RetrievalConfig {
                min_confidence,
                ..Default::default()
            },
            RetryPolicy::no_retry(),
        )
    }

    #[test]
    fn test_confidence_from_distance() {
        assert_eq!(confidence_from_distance(0.0), 100.0);
        assert!((confidence_from_distance(0.25) - 75.0).abs() < 1e-4);
        assert_eq!(confidence_from_distance(1.5), 0.0);
        assert_eq!(confidence_from_distance(-0.1), 100.0);
        assert_eq!(confidence_from_distance(f32::NAN), 0.0);
    }

    #[tokio::test]
    async fn test_fewer_entries_than_top_k_not_padded() {
        let retriever = retriever_with(
            &[
                ("legislation", "prazo prescricional trabalhista"),
                ("legislation", "prescrição trabalhista cinco anos"),
                ("legislation", "prazo de prescrição"),
            ],
            0.0,
        )
        .await;

        let result = retriever
            .retrieve("prescrição trabalhista", &SearchFilter::default(), 5)
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 3);
        for pair in result.sources.windows(2) {
            assert!(pair[0].distance <= pair[1].distance);
        }
        assert!(!result.context_summary.is_empty());
    }

    #[tokio::test]
    async fn test_min_confidence_discards_weak_matches() {
        let retriever = retriever_with(
            &[
                ("legislation", "prescrição trabalhista"),
                ("legislation", "locação de imóveis urbanos"),
            ],
            90.0,
        )
        .await;

        let result = retriever
            .retrieve("prescrição trabalhista", &SearchFilter::default(), 5)
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 1);
        assert!(result.sources[0].confidence >= 90.0);
    }

    #[tokio::test]
    async fn test_source_type_filter_and_citations() {
        let retriever = retriever_with(
            &[
                ("legislation", "prescrição trabalhista"),
                ("jurisprudence", "prescrição trabalhista súmula"),
            ],
            0.0,
        )
        .await;

        let result = retriever
            .retrieve(
                "prescrição trabalhista",
                &SearchFilter::source_type("jurisprudence"),
                5,
            )
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 1);
        let citations = result.citations();
        assert_eq!(citations[0].source_type, "jurisprudence");
        assert!((0.0..=1.0).contains(&citations[0].confidence_score));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let retriever = retriever_with(&[], 0.0).await;
        assert!(matches!(
            retriever.retrieve("  ", &SearchFilter::default(), 5).await,
            Err(AgentError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_between_embedder_and_store() {
        let store = Arc::new(InMemoryKnowledgeStore::new(8));
        let retriever = RagRetriever::with_config(
            store,
            Arc::new(HashingEmbedder::new(16)),
            RetrievalConfig::default(),
            RetryPolicy::no_retry(),
        );
        assert!(retriever
            .retrieve("x", &SearchFilter::default(), 5)
            .await
            .is_err());
    }
}

//! Retrieval-augmented generation
//!
//! Components:
//! - Retriever: embed the query, search the knowledge store, rank and filter
//! - Context builder: assemble a token-bounded summary of the sources

pub mod context;
pub mod retriever;

pub use context::{AssembledContext, ContextBuilder, ContextConfig};
pub use retriever::{
    confidence_from_distance, RagRetriever, RetrievalConfig, RetrievalResult, RetrievedSource,
};

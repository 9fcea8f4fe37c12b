//! Knowledge search tools
//!
//! `search_legislation`, `search_jurisprudence` and `search_knowledge_base`
//! share one implementation that delegates to the RAG retriever, optionally
//! pinned to a source type.

use crate::errors::Result;
use crate::rag::RagRetriever;
use crate::tools::types::{ToolCapability, ToolOutput};
use crate::types::{SearchFilter, Tool};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

/// Upper bound of `top_k` accepted from the model
const MAX_TOP_K: usize = 20;

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    tags: Vec<String>,
    /// Only honoured by the unpinned knowledge base search
    #[serde(default)]
    source_type: Option<String>,
}

/// Retrieval-backed search capability
pub struct KnowledgeSearchTool {
    retriever: RagRetriever,
    /// Source type every query is restricted to
    pinned_source_type: Option<String>,
}

impl KnowledgeSearchTool {
    pub fn new(retriever: RagRetriever, pinned_source_type: Option<&str>) -> Self {
        Self {
            retriever,
            pinned_source_type: pinned_source_type.map(String::from),
        }
    }

    pub fn legislation(retriever: RagRetriever) -> Self {
        Self::new(retriever, Some("legislation"))
    }

    pub fn jurisprudence(retriever: RagRetriever) -> Self {
        Self::new(retriever, Some("jurisprudence"))
    }

    pub fn knowledge_base(retriever: RagRetriever) -> Self {
        Self::new(retriever, None)
    }
}

#[async_trait]
impl ToolCapability for KnowledgeSearchTool {
    async fn execute(&self, params: serde_json::Value) -> Result<ToolOutput> {
        let params: SearchParams = serde_json::from_value(params)?;
        let top_k = params
            .top_k
            .unwrap_or(self.retriever.config().top_k)
            .clamp(1, MAX_TOP_K);
        let filter = SearchFilter {
            source_type: self.pinned_source_type.clone().or(params.source_type),
            tags: params.tags,
        };

        let result = self.retriever.retrieve(&params.query, &filter, top_k).await?;

        let sources: Vec<_> = result
            .sources
            .iter()
            .map(|s| {
                json!({
                    "id": s.entry_id,
                    "title": s.title,
                    "source_type": s.source_type,
                    "source_url": s.source_url,
                    "content": s.content,
                    "confidence": (s.confidence * 10.0).round() / 10.0,
                })
            })
            .collect();

        Ok(ToolOutput::new(json!({
            "query": params.query,
            "total": sources.len(),
            "sources": sources,
            "context_summary": result.context_summary,
        }))
        .with_citations(result.citations()))
    }
}

fn search_schema(with_source_type: bool) -> serde_json::Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "minLength": 1,
                "description": "Natural-language search query"
            },
            "top_k": {
                "type": "integer",
                "minimum": 1,
                "maximum": MAX_TOP_K,
                "description": "Maximum number of sources to return"
            },
            "tags": {
                "type": "array",
                "items": { "type": "string" },
                "description": "Restrict to entries carrying any of these tags"
            }
        },
        "required": ["query"]
    });
    if with_source_type {
        schema["properties"]["source_type"] = json!({
            "type": "string",
            "description": "Restrict to one source type (legislation, jurisprudence, doctrine, template)"
        });
    }
    schema
}

fn search_tool(slug: &str, name: &str, description: &str, with_source_type: bool) -> Tool {
    Tool {
        slug: slug.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        function_name: slug.to_string(),
        parameters_schema: search_schema(with_source_type),
        requires_auth: false,
        allowed_agents: None,
        is_active: true,
    }
}

pub fn legislation_tool() -> Tool {
    search_tool(
        "search_legislation",
        "Search legislation",
        "Search statutes, codes and regulations in the knowledge base",
        false,
    )
}

pub fn jurisprudence_tool() -> Tool {
    search_tool(
        "search_jurisprudence",
        "Search jurisprudence",
        "Search court decisions, precedents and súmulas in the knowledge base",
        false,
    )
}

pub fn knowledge_base_tool() -> Tool {
    search_tool(
        "search_knowledge_base",
        "Search knowledge base",
        "Search every source in the legal knowledge base",
        true,
    )
}

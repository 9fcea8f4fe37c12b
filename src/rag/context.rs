//! Context builder for retrieval-augmented prompts

use serde::{Deserialize, Serialize};

use crate::rag::retriever::RetrievedSource;

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Maximum tokens for retrieved context
    pub max_context_tokens: usize,
    /// Include source metadata in context
    pub include_metadata: bool,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_tokens: 1500,
            include_metadata: true,
        }
    }
}

/// Assembled context for prompt augmentation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssembledContext {
    /// The formatted context text
    pub text: String,
    /// Number of sources included
    pub document_count: usize,
    /// Estimated token count
    pub estimated_tokens: usize,
    /// Knowledge entry ids included
    pub source_ids: Vec<i64>,
}

/// Rough token estimate: ~4 characters per token
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Context builder for assembling retrieved sources
#[derive(Debug, Clone, Default)]
pub struct ContextBuilder {
    config: ContextConfig,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Concatenate sources in rank order until the token budget is spent.
    /// The source that crosses the budget is cut to fit.
    pub fn build(&self, sources: &[RetrievedSource]) -> AssembledContext {
        let mut parts = Vec::new();
        let mut total_tokens = 0;
        let mut source_ids = Vec::new();

        for source in sources {
            let remaining = self.config.max_context_tokens.saturating_sub(total_tokens);
            if remaining == 0 {
                break;
            }

            let tokens = estimate_tokens(&source.content);
            let content = if tokens > remaining {
                truncate_chars(&source.content, remaining * 4)
            } else {
                source.content.as_str()
            };
            if content.is_empty() {
                break;
            }

            parts.push(self.format_source(parts.len() + 1, source, content));
            total_tokens += estimate_tokens(content);
            source_ids.push(source.entry_id);

            if tokens > remaining {
                break;
            }
        }

        let text = if parts.is_empty() {
            String::new()
        } else {
            format!(
                "Retrieved context ({} sources):\n\n{}\n",
                parts.len(),
                parts.join("\n\n")
            )
        };

        AssembledContext {
            text,
            document_count: parts.len(),
            estimated_tokens: total_tokens,
            source_ids,
        }
    }

    fn format_source(&self, index: usize, source: &RetrievedSource, content: &str) -> String {
        if !self.config.include_metadata {
            return format!("[{}]\n{}", index, content);
        }
        let title = source.title.as_deref().unwrap_or(&source.source_type);
        match &source.source_url {
            Some(url) => format!(
                "[{}] {} ({}, confidence {:.0}%, {})\n{}",
                index, title, source.source_type, source.confidence, url, content
            ),
            None => format!(
                "[{}] {} ({}, confidence {:.0}%)\n{}",
                index, title, source.source_type, source.confidence, content
            ),
        }
    }
}

/// Prefix of at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

//! Knowledge base entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A content chunk that can be retrieved by embedding similarity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    pub id: i64,
    pub content: String,

    /// `None` while the entry waits for the ingestion worker
    pub embedding: Option<Vec<f32>>,

    /// e.g. `legislation`, `jurisprudence`, `doctrine`, `template`
    pub source_type: String,
    pub source_id: Option<String>,
    pub source_url: Option<String>,
    pub title: Option<String>,
    pub tags: Vec<String>,
    pub language: String,
    pub created_at: DateTime<Utc>,
}

impl KnowledgeEntry {
    pub fn is_embedded(&self) -> bool {
        self.embedding.is_some()
    }

    /// Does the entry carry at least one of the given tags
    pub fn has_any_tag(&self, tags: &[String]) -> bool {
        tags.iter().any(|t| self.tags.contains(t))
    }
}

/// Parameters for inserting an entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewKnowledgeEntry {
    pub content: String,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    pub source_type: String,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

impl NewKnowledgeEntry {
    pub fn new(source_type: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            embedding: None,
            source_type: source_type.into(),
            source_id: None,
            source_url: None,
            title: None,
            tags: Vec::new(),
            language: default_language(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn into_entry(self, id: i64, created_at: DateTime<Utc>) -> KnowledgeEntry {
        KnowledgeEntry {
            id,
            content: self.content,
            embedding: self.embedding,
            source_type: self.source_type,
            source_id: self.source_id,
            source_url: self.source_url,
            title: self.title,
            tags: self.tags,
            language: self.language,
            created_at,
        }
    }
}

/// Restricts a similarity search
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    pub source_type: Option<String>,
    /// Entry matches if it has any of these tags; empty means no tag filter
    pub tags: Vec<String>,
}

impl SearchFilter {
    pub fn source_type(source_type: impl Into<String>) -> Self {
        Self {
            source_type: Some(source_type.into()),
            tags: Vec::new(),
        }
    }

    pub fn matches(&self, entry: &KnowledgeEntry) -> bool {
        if let Some(source_type) = &self.source_type {
            if &entry.source_type != source_type {
                return false;
            }
        }
        self.tags.is_empty() || entry.has_any_tag(&self.tags)
    }
}

/// An entry with its cosine distance to the query
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredEntry {
    pub entry: KnowledgeEntry,
    pub distance: f32,
}

fn default_language() -> String {
    "pt-BR".to_string()
}

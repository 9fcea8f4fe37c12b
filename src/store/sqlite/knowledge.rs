//! SQLite knowledge store
//!
//! Embeddings are bincode blobs. Similarity search scans the embedded rows
//! of one read transaction, so concurrent inserts through WAL never show up
//! half-written in a scan.

use crate::errors::{AgentError, Result};
use crate::knowledge::{check_dimensions, similarity, KnowledgeStore};
use crate::store::now;
use crate::store::sqlite::{conversion_error, parse_json, parse_timestamp, timestamp, Database};
use crate::types::{KnowledgeEntry, NewKnowledgeEntry, ScoredEntry, SearchFilter};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const ENTRY_COLUMNS: &str =
    "id, content, embedding, source_type, source_id, source_url, title, tags, language, created_at";

#[derive(Debug, Clone)]
pub struct SqliteKnowledgeStore {
    db: Database,
    dimensions: usize,
}

impl SqliteKnowledgeStore {
    pub fn new(db: Database, dimensions: usize) -> Self {
        Self { db, dimensions }
    }
}

fn encode_embedding(embedding: &Option<Vec<f32>>) -> Result<Option<Vec<u8>>> {
    embedding
        .as_ref()
        .map(|e| bincode::serialize(e).map_err(AgentError::from))
        .transpose()
}

fn row_to_entry(row: &Row) -> rusqlite::Result<KnowledgeEntry> {
    let blob: Option<Vec<u8>> = row.get(2)?;
    let embedding = blob
        .map(|bytes| bincode::deserialize::<Vec<f32>>(&bytes).map_err(|e| conversion_error(2, e)))
        .transpose()?;
    Ok(KnowledgeEntry {
        id: row.get(0)?,
        content: row.get(1)?,
        embedding,
        source_type: row.get(3)?,
        source_id: row.get(4)?,
        source_url: row.get(5)?,
        title: row.get(6)?,
        tags: parse_json(7, &row.get::<_, String>(7)?)?,
        language: row.get(8)?,
        created_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
    })
}

fn load_entry(conn: &Connection, id: i64) -> Result<Option<KnowledgeEntry>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM knowledge_entries WHERE id = ?1", ENTRY_COLUMNS),
            [id],
            row_to_entry,
        )
        .optional()?)
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn insert(&self, entry: NewKnowledgeEntry) -> Result<KnowledgeEntry> {
        if let Some(embedding) = &entry.embedding {
            check_dimensions(self.dimensions, embedding)?;
        }
        self.db
            .run(move |conn| {
                let created_at = now();
                conn.execute(
                    "INSERT INTO knowledge_entries
                     (content, embedding, source_type, source_id, source_url, title, tags, language, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        entry.content,
                        encode_embedding(&entry.embedding)?,
                        entry.source_type,
                        entry.source_id,
                        entry.source_url,
                        entry.title,
                        serde_json::to_string(&entry.tags)?,
                        entry.language,
                        timestamp(created_at),
                    ],
                )?;
                let id = conn.last_insert_rowid();
                Ok(entry.into_entry(id, created_at))
            })
            .await
    }

    async fn find(&self, id: i64) -> Result<Option<KnowledgeEntry>> {
        self.db.run(move |conn| load_entry(conn, id)).await
    }

    async fn update(&self, entry: KnowledgeEntry) -> Result<KnowledgeEntry> {
        if let Some(embedding) = &entry.embedding {
            check_dimensions(self.dimensions, embedding)?;
        }
        self.db
            .run(move |conn| {
                let updated = conn.execute(
                    "UPDATE knowledge_entries
                     SET content = ?1, embedding = ?2, source_type = ?3, source_id = ?4,
                         source_url = ?5, title = ?6, tags = ?7, language = ?8
                     WHERE id = ?9",
                    params![
                        entry.content,
                        encode_embedding(&entry.embedding)?,
                        entry.source_type,
                        entry.source_id,
                        entry.source_url,
                        entry.title,
                        serde_json::to_string(&entry.tags)?,
                        entry.language,
                        entry.id,
                    ],
                )?;
                if updated == 0 {
                    return Err(AgentError::not_found("KnowledgeEntry", entry.id.to_string()));
                }
                Ok(entry)
            })
            .await
    }

    async fn similarity_search(
        &self,
        embedding: &[f32],
        limit: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<ScoredEntry>> {
        check_dimensions(self.dimensions, embedding)?;
        let query = embedding.to_vec();
        let filter = filter.clone();

        self.db
            .run(move |conn| {
                let tx = conn.transaction()?;
                let candidates = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {} FROM knowledge_entries
                         WHERE embedding IS NOT NULL AND (?1 IS NULL OR source_type = ?1)",
                        ENTRY_COLUMNS
                    ))?;
                    let rows = stmt
                        .query_map([filter.source_type.as_deref()], row_to_entry)?
                        .collect::<rusqlite::Result<Vec<_>>>()?;
                    rows
                };
                tx.commit()?;

                debug!(candidates = candidates.len(), "knowledge scan");
                Ok(similarity::rank(
                    &query,
                    candidates.iter().filter(|e| filter.matches(e)),
                    limit,
                ))
            })
            .await
    }

    async fn list_unembedded(&self, limit: usize) -> Result<Vec<KnowledgeEntry>> {
        self.db
            .run(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM knowledge_entries WHERE embedding IS NULL ORDER BY id LIMIT ?1",
                    ENTRY_COLUMNS
                ))?;
                let rows = stmt
                    .query_map([limit as i64], row_to_entry)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    async fn count(&self) -> Result<usize> {
        self.db
            .run(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM knowledge_entries", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

//! SQLite conversation store

use crate::errors::{AgentError, Result};
use crate::store::sqlite::{
    conversation_state, parse_json, parse_timestamp, parse_uuid, timestamp, Database,
};
use crate::store::{now, ConversationStore};
use crate::types::{
    Citation, Conversation, ConversationMode, Message, NewConversation, NewMessage, Role,
};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::collections::HashMap;
use uuid::Uuid;

const CONVERSATION_COLUMNS: &str = "id, user_id, agent_slug, folder_id, title, mode, \
                                    total_tokens, is_active, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct SqliteConversationStore {
    db: Database,
}

impl SqliteConversationStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_conversation(row: &Row) -> rusqlite::Result<Conversation> {
    let mode: String = row.get(5)?;
    Ok(Conversation {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        user_id: row.get(1)?,
        agent_slug: row.get(2)?,
        folder_id: row.get(3)?,
        title: row.get(4)?,
        mode: mode
            .parse::<ConversationMode>()
            .map_err(|e| super::conversion_error(5, e))?,
        total_tokens: row.get::<_, i64>(6)? as u64,
        is_active: row.get(7)?,
        created_at: parse_timestamp(8, &row.get::<_, String>(8)?)?,
        updated_at: parse_timestamp(9, &row.get::<_, String>(9)?)?,
    })
}

fn row_to_message(row: &Row) -> rusqlite::Result<Message> {
    let role: String = row.get(3)?;
    Ok(Message {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        conversation_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        position: row.get::<_, i64>(2)? as u64,
        role: role
            .parse::<Role>()
            .map_err(|e| super::conversion_error(3, e))?,
        content: row.get(4)?,
        agent_slug: row.get(5)?,
        tool_calls: parse_json(6, &row.get::<_, String>(6)?)?,
        tool_results: parse_json(7, &row.get::<_, String>(7)?)?,
        tokens: row.get::<_, i64>(8)? as u64,
        finish_reason: row.get(9)?,
        citations: Vec::new(),
        created_at: parse_timestamp(10, &row.get::<_, String>(10)?)?,
    })
}

fn row_to_citation(row: &Row) -> rusqlite::Result<Citation> {
    Ok(Citation {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        message_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        source_type: row.get(2)?,
        source_url: row.get(3)?,
        excerpt: row.get(4)?,
        confidence_score: row.get::<_, f64>(5)? as f32,
    })
}

fn load_conversation(conn: &Connection, id: Uuid) -> Result<Conversation> {
    conn.query_row(
        &format!("SELECT {} FROM conversations WHERE id = ?1", CONVERSATION_COLUMNS),
        [id.to_string()],
        row_to_conversation,
    )
    .optional()?
    .ok_or_else(|| AgentError::not_found("Conversation", id.to_string()))
}

fn insert_message(conn: &mut Connection, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    match conversation_state(&tx, conversation_id)? {
        None => return Err(AgentError::not_found("Conversation", conversation_id.to_string())),
        Some(false) => {
            return Err(AgentError::Validation(format!(
                "conversation {} is deleted",
                conversation_id
            )))
        }
        Some(true) => {}
    }

    let position: i64 = tx.query_row(
        "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1",
        [conversation_id.to_string()],
        |row| row.get(0),
    )?;

    let id = Uuid::new_v4();
    let now = now();
    let role = message.role();
    tx.execute(
        "INSERT INTO messages
         (id, conversation_id, position, role, content, agent_slug, tool_calls, tool_results,
          tokens, finish_reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id.to_string(),
            conversation_id.to_string(),
            position,
            role.as_str(),
            message.content,
            message.agent_slug,
            serde_json::to_string(&message.tool_calls)?,
            serde_json::to_string(&message.tool_results)?,
            message.tokens as i64,
            message.finish_reason,
            timestamp(now),
        ],
    )?;

    let citations: Vec<Citation> = message
        .citations
        .into_iter()
        .map(|c| c.into_citation(id))
        .collect();
    for citation in &citations {
        tx.execute(
            "INSERT INTO citations (id, message_id, source_type, source_url, excerpt, confidence_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                citation.id.to_string(),
                id.to_string(),
                citation.source_type,
                citation.source_url,
                citation.excerpt,
                citation.confidence_score as f64,
            ],
        )?;
    }

    tx.execute(
        "UPDATE conversations SET total_tokens = total_tokens + ?1, updated_at = ?2 WHERE id = ?3",
        params![message.tokens as i64, timestamp(now), conversation_id.to_string()],
    )?;
    tx.commit()?;

    Ok(Message {
        id,
        conversation_id,
        position: position as u64,
        role,
        content: message.content,
        agent_slug: message.agent_slug,
        tool_calls: message.tool_calls,
        tool_results: message.tool_results,
        tokens: message.tokens,
        finish_reason: message.finish_reason,
        citations,
        created_at: now,
    })
}

fn load_messages(conn: &Connection, conversation_id: Uuid) -> Result<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, position, role, content, agent_slug, tool_calls,
                tool_results, tokens, finish_reason, created_at
         FROM messages WHERE conversation_id = ?1 ORDER BY position",
    )?;
    let mut messages = stmt
        .query_map([conversation_id.to_string()], row_to_message)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    let mut stmt = conn.prepare(
        "SELECT c.id, c.message_id, c.source_type, c.source_url, c.excerpt, c.confidence_score
         FROM citations c JOIN messages m ON m.id = c.message_id
         WHERE m.conversation_id = ?1 ORDER BY c.rowid",
    )?;
    let mut by_message: HashMap<Uuid, Vec<Citation>> = HashMap::new();
    for citation in stmt.query_map([conversation_id.to_string()], row_to_citation)? {
        let citation = citation?;
        by_message.entry(citation.message_id).or_default().push(citation);
    }
    for message in &mut messages {
        if let Some(citations) = by_message.remove(&message.id) {
            message.citations = citations;
        }
    }
    Ok(messages)
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create(&self, conversation: NewConversation) -> Result<Conversation> {
        self.db
            .run(move |conn| {
                let now = now();
                let created = Conversation {
                    id: Uuid::new_v4(),
                    user_id: conversation.user_id,
                    agent_slug: conversation.agent_slug,
                    folder_id: conversation.folder_id,
                    title: conversation.title,
                    mode: conversation.mode,
                    total_tokens: 0,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                conn.execute(
                    &format!(
                        "INSERT INTO conversations ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1, ?7, ?7)",
                        CONVERSATION_COLUMNS
                    ),
                    params![
                        created.id.to_string(),
                        created.user_id,
                        created.agent_slug,
                        created.folder_id,
                        created.title,
                        created.mode.as_str(),
                        timestamp(now),
                    ],
                )?;
                Ok(created)
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<Conversation> {
        self.db.run(move |conn| load_conversation(conn, id)).await
    }

    async fn list_by_user(&self, user_id: &str) -> Result<Vec<Conversation>> {
        let user_id = user_id.to_string();
        self.db
            .run(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM conversations WHERE user_id = ?1 AND is_active = 1
                     ORDER BY updated_at DESC, rowid DESC",
                    CONVERSATION_COLUMNS
                ))?;
                let conversations = stmt
                    .query_map([user_id], row_to_conversation)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(conversations)
            })
            .await
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        self.db
            .run(move |conn| {
                let updated = conn.execute(
                    "UPDATE conversations SET is_active = 0, updated_at = ?1 WHERE id = ?2",
                    params![timestamp(now()), id.to_string()],
                )?;
                if updated == 0 {
                    return Err(AgentError::not_found("Conversation", id.to_string()));
                }
                Ok(())
            })
            .await
    }

    async fn append_message(&self, conversation_id: Uuid, message: NewMessage) -> Result<Message> {
        self.db
            .run(move |conn| insert_message(conn, conversation_id, message))
            .await
    }

    async fn list_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        self.db
            .run(move |conn| {
                load_conversation(conn, conversation_id)?;
                load_messages(conn, conversation_id)
            })
            .await
    }

    async fn total_tokens(&self, conversation_id: Uuid) -> Result<u64> {
        Ok(self.get(conversation_id).await?.total_tokens)
    }
}

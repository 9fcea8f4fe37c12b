//! SQLite execution ledger
//!
//! Rows are only ever inserted and closed. A trigger rejects deletes and
//! status changes on terminal rows as a second line behind the state machine.

use crate::agent::state::ExecutionStatus;
use crate::errors::{AgentError, Result};
use crate::store::sqlite::{parse_json, parse_timestamp, parse_uuid, timestamp, Database};
use crate::store::{close_execution, open_execution, ExecutionLedger, ExecutionQuery};
use crate::types::{AgentExecution, ExecutionOutcome, ExecutionStats, NewExecution};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use uuid::Uuid;

const EXECUTION_COLUMNS: &str = "id, conversation_id, agent_slug, workflow_slug, step_index, \
                                 status, input, output, tool_calls, tokens_used, duration_ms, \
                                 error_message, started_at, completed_at";

#[derive(Debug, Clone)]
pub struct SqliteExecutionLedger {
    db: Database,
}

impl SqliteExecutionLedger {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

fn row_to_execution(row: &Row) -> rusqlite::Result<AgentExecution> {
    let status: String = row.get(5)?;
    let completed_at: Option<String> = row.get(13)?;
    Ok(AgentExecution {
        id: parse_uuid(0, &row.get::<_, String>(0)?)?,
        conversation_id: parse_uuid(1, &row.get::<_, String>(1)?)?,
        agent_slug: row.get(2)?,
        workflow_slug: row.get(3)?,
        step_index: row.get::<_, Option<i64>>(4)?.map(|i| i as usize),
        status: status
            .parse::<ExecutionStatus>()
            .map_err(|e| super::conversion_error(5, e))?,
        input: row.get(6)?,
        output: row.get(7)?,
        tool_calls: parse_json(8, &row.get::<_, String>(8)?)?,
        tokens_used: row.get::<_, i64>(9)? as u64,
        duration_ms: row.get::<_, Option<i64>>(10)?.map(|d| d as u64),
        error_message: row.get(11)?,
        started_at: parse_timestamp(12, &row.get::<_, String>(12)?)?,
        completed_at: completed_at
            .map(|raw| parse_timestamp(13, &raw))
            .transpose()?,
    })
}

fn load_execution(conn: &Connection, id: Uuid) -> Result<AgentExecution> {
    conn.query_row(
        &format!("SELECT {} FROM agent_executions WHERE id = ?1", EXECUTION_COLUMNS),
        [id.to_string()],
        row_to_execution,
    )
    .optional()?
    .ok_or_else(|| AgentError::not_found("Execution", id.to_string()))
}

/// Rows matching the optional filters, most recently started first
fn select_executions(
    conn: &Connection,
    conversation_id: Option<Uuid>,
    agent_slug: Option<String>,
    status: Option<ExecutionStatus>,
    limit: Option<usize>,
) -> Result<Vec<AgentExecution>> {
    let mut clauses = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(id) = conversation_id {
        values.push(Value::Text(id.to_string()));
        clauses.push(format!("conversation_id = ?{}", values.len()));
    }
    if let Some(slug) = agent_slug {
        values.push(Value::Text(slug));
        clauses.push(format!("agent_slug = ?{}", values.len()));
    }
    if let Some(status) = status {
        values.push(Value::Text(status.as_str().to_string()));
        clauses.push(format!("status = ?{}", values.len()));
    }

    let mut sql = format!("SELECT {} FROM agent_executions", EXECUTION_COLUMNS);
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY started_at DESC, rowid DESC");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(values), row_to_execution)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

#[async_trait]
impl ExecutionLedger for SqliteExecutionLedger {
    async fn start(&self, execution: NewExecution) -> Result<AgentExecution> {
        let row = open_execution(execution)?;
        self.db
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO agent_executions
                     (id, conversation_id, agent_slug, workflow_slug, step_index, status, input,
                      tool_calls, tokens_used, started_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]', 0, ?8)",
                    params![
                        row.id.to_string(),
                        row.conversation_id.to_string(),
                        row.agent_slug,
                        row.workflow_slug,
                        row.step_index.map(|i| i as i64),
                        row.status.as_str(),
                        row.input,
                        timestamp(row.started_at),
                    ],
                )?;
                Ok(row)
            })
            .await
    }

    async fn complete(&self, id: Uuid, outcome: ExecutionOutcome) -> Result<AgentExecution> {
        self.db
            .run(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut row = load_execution(&tx, id)?;
                close_execution(&mut row, outcome)?;

                tx.execute(
                    "UPDATE agent_executions
                     SET status = ?1, output = ?2, tool_calls = ?3, tokens_used = ?4,
                         duration_ms = ?5, error_message = ?6, completed_at = ?7
                     WHERE id = ?8",
                    params![
                        row.status.as_str(),
                        row.output,
                        serde_json::to_string(&row.tool_calls)?,
                        row.tokens_used as i64,
                        row.duration_ms.map(|d| d as i64),
                        row.error_message,
                        row.completed_at.map(timestamp),
                        id.to_string(),
                    ],
                )?;
                tx.commit()?;
                Ok(row)
            })
            .await
    }

    async fn get(&self, id: Uuid) -> Result<AgentExecution> {
        self.db.run(move |conn| load_execution(conn, id)).await
    }

    async fn list(&self, query: &ExecutionQuery) -> Result<Vec<AgentExecution>> {
        let query = query.clone();
        self.db
            .run(move |conn| {
                select_executions(conn, query.conversation_id, query.agent_slug, None, query.limit)
            })
            .await
    }

    async fn statistics(&self, agent_slug: Option<&str>) -> Result<ExecutionStats> {
        let agent_slug = agent_slug.map(String::from);
        let rows = self
            .db
            .run(move |conn| select_executions(conn, None, agent_slug, None, None))
            .await?;
        Ok(ExecutionStats::from_executions(&rows))
    }

    async fn failed_executions(
        &self,
        agent_slug: Option<&str>,
        limit: Option<usize>,
    ) -> Result<Vec<AgentExecution>> {
        let agent_slug = agent_slug.map(String::from);
        self.db
            .run(move |conn| {
                select_executions(conn, None, agent_slug, Some(ExecutionStatus::Failed), limit)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::SqliteConversationStore;
    use crate::store::ConversationStore;
    use crate::types::NewConversation;

    async fn setup() -> (SqliteExecutionLedger, Uuid, Database) {
        let db = Database::in_memory().unwrap();
        let conversation = SqliteConversationStore::new(db.clone())
            .create(NewConversation::workflow("lawyer-a"))
            .await
            .unwrap();
        (SqliteExecutionLedger::new(db.clone()), conversation.id, db)
    }

    fn new_execution(conversation_id: Uuid, agent: &str, step: usize) -> NewExecution {
        NewExecution {
            conversation_id,
            agent_slug: agent.to_string(),
            workflow_slug: Some("full-case-analysis".to_string()),
            step_index: Some(step),
            input: "analisar caso".to_string(),
        }
    }

    #[tokio::test]
    async fn test_start_and_complete() {
        let (ledger, conversation_id, _db) = setup().await;

        let row = ledger
            .start(new_execution(conversation_id, "legal-research", 0))
            .await
            .unwrap();
        assert_eq!(ledger.get(row.id).await.unwrap().status, ExecutionStatus::Running);

        let done = ledger
            .complete(
                row.id,
                ExecutionOutcome::Completed {
                    output: "pesquisa".to_string(),
                    tool_calls: Vec::new(),
                    tokens_used: 55,
                    duration_ms: 12,
                },
            )
            .await
            .unwrap();
        let stored = ledger.get(row.id).await.unwrap();
        assert_eq!(stored, done);
        assert_eq!(stored.step_index, Some(0));
        assert!(stored.completed_at.unwrap() >= stored.started_at);

        let again = ledger
            .complete(
                row.id,
                ExecutionOutcome::Failed {
                    error_message: "x".to_string(),
                    tool_calls: Vec::new(),
                    tokens_used: 0,
                    duration_ms: 0,
                },
            )
            .await;
        assert!(again.is_err());
    }

    #[tokio::test]
    async fn test_rows_cannot_be_deleted() {
        let (ledger, conversation_id, db) = setup().await;
        let row = ledger
            .start(new_execution(conversation_id, "legal-research", 0))
            .await
            .unwrap();

        let id = row.id.to_string();
        let deleted = db
            .run(move |conn| Ok(conn.execute("DELETE FROM agent_executions WHERE id = ?1", [id])?))
            .await;
        assert!(deleted.is_err());
        assert!(ledger.get(row.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_failed_listing_and_stats() {
        let (ledger, conversation_id, _db) = setup().await;

        let ok = ledger
            .start(new_execution(conversation_id, "legal-research", 0))
            .await
            .unwrap();
        ledger
            .complete(
                ok.id,
                ExecutionOutcome::Completed {
                    output: "a".to_string(),
                    tool_calls: Vec::new(),
                    tokens_used: 100,
                    duration_ms: 40,
                },
            )
            .await
            .unwrap();
        let bad = ledger
            .start(new_execution(conversation_id, "document-analyzer", 1))
            .await
            .unwrap();
        ledger
            .complete(
                bad.id,
                ExecutionOutcome::Failed {
                    error_message: "Operation timed out after 50ms".to_string(),
                    tool_calls: Vec::new(),
                    tokens_used: 0,
                    duration_ms: 60,
                },
            )
            .await
            .unwrap();

        let failed = ledger.failed_executions(None, None).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, bad.id);
        assert_eq!(failed, ledger.failed_executions(None, None).await.unwrap());

        let listed = ledger
            .list(&ExecutionQuery::conversation(conversation_id))
            .await
            .unwrap();
        assert_eq!(
            listed.iter().map(|r| r.id).collect::<Vec<_>>(),
            vec![bad.id, ok.id]
        );

        let stats = ledger.statistics(None).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.total_tokens, 100);
        assert!((stats.average_duration_ms - 50.0).abs() < f64::EPSILON);
        assert_eq!(ledger.statistics(Some("document-analyzer")).await.unwrap().failed, 1);
    }
}

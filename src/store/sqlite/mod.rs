//! SQLite persistence
//!
//! One r2d2 pool shared by the conversation store, the execution ledger
//! and the knowledge store. Schema changes are versioned migrations
//! applied at open time. Blocking database work runs on the tokio
//! blocking pool.

pub mod conversations;
pub mod executions;
pub mod knowledge;

pub use conversations::SqliteConversationStore;
pub use executions::SqliteExecutionLedger;
pub use knowledge::SqliteKnowledgeStore;

use crate::errors::{AgentError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Connections kept by a file-backed pool
const FILE_POOL_SIZE: u32 = 8;

/// Ordered schema migrations
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("migrations/001_conversations.sql")),
    (2, include_str!("migrations/002_knowledge.sql")),
];

/// Pooled SQLite database
#[derive(Debug, Clone)]
pub struct Database {
    pool: Arc<Pool<SqliteConnectionManager>>,
}

impl Database {
    /// Open (or create) a database file and apply pending migrations
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        info!(path = %path.display(), "opening database");

        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA foreign_keys = ON;
                 PRAGMA busy_timeout = 5000;
                 PRAGMA synchronous = NORMAL;",
            )
        });
        let database = Self::build(manager, FILE_POOL_SIZE)?;
        database
            .connection()?
            .execute_batch("PRAGMA journal_mode = WAL;")?;
        Ok(database)
    }

    /// Private in-memory database; the pool holds a single connection so
    /// every caller sees the same data
    pub fn in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory()
            .with_init(|conn| conn.execute_batch("PRAGMA foreign_keys = ON;"));
        Self::build(manager, 1)
    }

    fn build(manager: SqliteConnectionManager, max_size: u32) -> Result<Self> {
        let pool = Pool::builder().max_size(max_size).build(manager)?;
        let database = Self {
            pool: Arc::new(pool),
        };
        let mut conn = database.connection()?;
        migrate(&mut conn)?;
        Ok(database)
    }

    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    /// Run `work` with a pooled connection on the blocking thread pool
    pub async fn run<F, T>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            work(&mut conn)
        })
        .await
        .map_err(|e| AgentError::Storage(format!("database task failed: {}", e)))?
    }

    /// Highest applied migration
    pub fn schema_version(&self) -> Result<i64> {
        let conn = self.connection()?;
        Ok(current_version(&conn)?)
    }
}

fn current_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    let current = current_version(conn)?;
    debug!(current, latest = MIGRATIONS.len(), "checking schema version");

    for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute(
            "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, timestamp(Utc::now())],
        )?;
        tx.commit()?;
        info!(version, "applied migration");
    }
    Ok(())
}

/// Fixed-width RFC 3339, so text order matches time order
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn conversion_error<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(err))
}

pub(crate) fn parse_timestamp(column: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(column, e))
}

pub(crate) fn parse_uuid(column: usize, raw: &str) -> rusqlite::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| conversion_error(column, e))
}

pub(crate) fn parse_json<T: serde::de::DeserializeOwned>(
    column: usize,
    raw: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(raw).map_err(|e| conversion_error(column, e))
}

/// `Some(true)` active, `Some(false)` soft-deleted, `None` unknown
pub(crate) fn conversation_state(conn: &Connection, id: Uuid) -> Result<Option<bool>> {
    Ok(conn
        .query_row(
            "SELECT is_active FROM conversations WHERE id = ?1",
            [id.to_string()],
            |row| row.get::<_, bool>(0),
        )
        .optional()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_migrations_applied_once() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lexflow.db");

        let db = Database::open(&path).unwrap();
        assert_eq!(db.schema_version().unwrap(), MIGRATIONS.len() as i64);
        drop(db);

        let reopened = Database::open(&path).unwrap();
        assert_eq!(reopened.schema_version().unwrap(), MIGRATIONS.len() as i64);
    }

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::milliseconds(1);
        assert!(timestamp(earlier) < timestamp(later));
        assert_eq!(parse_timestamp(0, &timestamp(earlier)).unwrap().timestamp_micros(), earlier.timestamp_micros());
    }

    #[tokio::test]
    async fn test_run_on_blocking_pool() {
        let db = Database::in_memory().unwrap();
        let tables: i64 = db
            .run(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'agent_executions'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }
}

//! Database connection and queued-action queries.

use crate::{migrations, ActionPriority, ActionStatus, DatabaseError, DatabaseResult, QueuedAction};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// SQLite-backed store for queued actions.
///
/// The connection sits behind a mutex so the store can be shared across
/// tokio tasks; the outbox is the only writer.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> DatabaseResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| DatabaseError::LockPoisoned)
    }

    /// Run a closure against the underlying connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> DatabaseResult<T> {
        let conn = self.conn()?;
        Ok(f(&conn)?)
    }

    /// Insert or atomically rewrite a queued action.
    pub fn put_action(&self, action: &QueuedAction) -> DatabaseResult<()> {
        let headers = serde_json::to_string(&action.headers)?;
        let body = action
            .body
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn()?.execute(
            "INSERT INTO queued_actions
                (id, method, url, headers, body, priority, timestamp,
                 retry_count, max_retries, status, error)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(id) DO UPDATE SET
                method = excluded.method,
                url = excluded.url,
                headers = excluded.headers,
                body = excluded.body,
                priority = excluded.priority,
                timestamp = excluded.timestamp,
                retry_count = excluded.retry_count,
                max_retries = excluded.max_retries,
                status = excluded.status,
                error = excluded.error",
            params![
                action.id,
                action.method,
                action.url,
                headers,
                body,
                action.priority.as_str(),
                action.timestamp.to_rfc3339(),
                action.retry_count,
                action.max_retries,
                action.status.as_str(),
                action.error,
            ],
        )?;

        debug!(id = %action.id, status = action.status.as_str(), "Persisted action");
        Ok(())
    }

    /// Get a queued action by id.
    pub fn get_action(&self, id: &str) -> DatabaseResult<Option<QueuedAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, method, url, headers, body, priority, timestamp,
                    retry_count, max_retries, status, error
             FROM queued_actions WHERE id = ?1",
        )?;

        let result = stmt.query_row(params![id], row_to_action);

        match result {
            Ok(action) => Ok(Some(action)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Get every queued action, oldest first.
    pub fn get_all_actions(&self) -> DatabaseResult<Vec<QueuedAction>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, method, url, headers, body, priority, timestamp,
                    retry_count, max_retries, status, error
             FROM queued_actions ORDER BY timestamp ASC",
        )?;

        let rows = stmt.query_map([], row_to_action)?;
        let mut actions = Vec::new();
        for row in rows {
            actions.push(row?);
        }
        Ok(actions)
    }

    /// Delete a queued action. Returns true if a row was removed.
    pub fn delete_action(&self, id: &str) -> DatabaseResult<bool> {
        let removed = self
            .conn()?
            .execute("DELETE FROM queued_actions WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Delete every completed action. Returns the number of rows removed.
    pub fn delete_completed(&self) -> DatabaseResult<usize> {
        let removed = self.conn()?.execute(
            "DELETE FROM queued_actions WHERE status = ?1",
            params![ActionStatus::Completed.as_str()],
        )?;
        Ok(removed)
    }

    /// Count actions with the given status.
    pub fn count_by_status(&self, status: ActionStatus) -> DatabaseResult<usize> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM queued_actions WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

fn row_to_action(row: &Row<'_>) -> rusqlite::Result<QueuedAction> {
    let headers: String = row.get(3)?;
    let body: Option<String> = row.get(4)?;
    let priority: String = row.get(5)?;
    let status: String = row.get(9)?;

    Ok(QueuedAction {
        id: row.get(0)?,
        method: row.get(1)?,
        url: row.get(2)?,
        headers: serde_json::from_str(&headers)
            .map_err(|e| conversion_error(3, e))?,
        body: body
            .map(|b| serde_json::from_str(&b))
            .transpose()
            .map_err(|e| conversion_error(4, e))?,
        priority: ActionPriority::parse(&priority)
            .ok_or_else(|| conversion_error(5, format!("invalid priority: {priority}")))?,
        timestamp: parse_datetime(row.get::<_, String>(6)?),
        retry_count: row.get(7)?,
        max_retries: row.get(8)?,
        status: ActionStatus::parse(&status)
            .ok_or_else(|| conversion_error(9, format!("invalid status: {status}")))?,
        error: row.get(10)?,
    })
}

fn conversion_error(
    idx: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, err.into())
}

fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

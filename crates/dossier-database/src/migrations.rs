//! Database migrations.
//!
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_queued_actions(conn)?;
    }
    if current_version < 2 {
        migrate_v2_retry_ceiling(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: queued actions table.
fn migrate_v1_queued_actions(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: queued actions");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS queued_actions (
            id TEXT PRIMARY KEY,
            method TEXT NOT NULL,
            url TEXT NOT NULL,
            headers TEXT NOT NULL DEFAULT '[]',
            body TEXT,
            priority TEXT NOT NULL DEFAULT 'normal',
            timestamp TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'pending',
            error TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_queued_actions_status
            ON queued_actions(status);
        CREATE INDEX IF NOT EXISTS idx_queued_actions_timestamp
            ON queued_actions(timestamp);
        ",
    )?;

    record_migration(conn, 1, "queued_actions")?;
    Ok(())
}

/// V2: per-action retry ceiling.
fn migrate_v2_retry_ceiling(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: retry ceiling");

    conn.execute_batch(
        "
        ALTER TABLE queued_actions
            ADD COLUMN max_retries INTEGER NOT NULL DEFAULT 3;
        ",
    )?;

    record_migration(conn, 2, "retry_ceiling")?;
    Ok(())
}

//! Database error types.

use thiserror::Error;

/// Database error type.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// IO error (directory creation)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (headers/body columns)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Connection lock poisoned by a panicking writer
    #[error("Connection lock poisoned")]
    LockPoisoned,

    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias using DatabaseError.
pub type DatabaseResult<T> = Result<T, DatabaseError>;

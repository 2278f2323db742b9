//! Durable local store for the dossier sync layer.
//!
//! This crate provides:
//! - Database: SQLite-backed store for queued actions (WAL mode)
//! - Versioned migrations with a tracking table
//! - Typed models for queued actions, their priority and status

mod db;
mod error;
mod migrations;
mod models;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::CURRENT_VERSION;
pub use models::{ActionPriority, ActionStatus, QueuedAction};

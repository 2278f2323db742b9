//! Typed models for queued actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery priority for a queued action. High drains before Normal,
/// Normal before Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    High,
    Normal,
    Low,
}

impl ActionPriority {
    /// TEXT column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionPriority::High => "high",
            ActionPriority::Normal => "normal",
            ActionPriority::Low => "low",
        }
    }

    /// Parse a TEXT column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "high" => Some(ActionPriority::High),
            "normal" => Some(ActionPriority::Normal),
            "low" => Some(ActionPriority::Low),
            _ => None,
        }
    }

    /// Sort rank; lower drains first.
    pub fn rank(&self) -> u8 {
        match self {
            ActionPriority::High => 0,
            ActionPriority::Normal => 1,
            ActionPriority::Low => 2,
        }
    }
}

/// Lifecycle status of a queued action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Completed,
    Failed,
}

impl ActionStatus {
    /// TEXT column value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionStatus::Pending => "pending",
            ActionStatus::Completed => "completed",
            ActionStatus::Failed => "failed",
        }
    }

    /// Parse a TEXT column value.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ActionStatus::Pending),
            "completed" => Some(ActionStatus::Completed),
            "failed" => Some(ActionStatus::Failed),
            _ => None,
        }
    }
}

/// One deferred write, as persisted in the `queued_actions` table.
///
/// The request payload (`method`, `url`, `headers`, `body`) is carried on
/// faith; the store never interprets it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedAction {
    /// Opaque unique token.
    pub id: String,
    /// HTTP method of the deferred request.
    pub method: String,
    /// Target URL of the deferred request.
    pub url: String,
    /// Request headers, persisted as a JSON column.
    pub headers: Vec<(String, String)>,
    /// Optional JSON request body.
    pub body: Option<serde_json::Value>,
    /// Delivery priority.
    pub priority: ActionPriority,
    /// Creation time; FIFO tiebreaker within a priority class.
    pub timestamp: DateTime<Utc>,
    /// Number of explicit retries performed so far.
    pub retry_count: u32,
    /// Retry ceiling; a failed action at the ceiling stays failed.
    pub max_retries: u32,
    /// Lifecycle status.
    pub status: ActionStatus,
    /// Last execution error, if any.
    pub error: Option<String>,
}

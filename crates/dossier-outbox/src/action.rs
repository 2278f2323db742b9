//! Draft of a write operation handed to the outbox.

use dossier_database::ActionPriority;

/// Default retry ceiling for new actions.
pub(crate) const DEFAULT_MAX_RETRIES: u32 = 3;

/// A write operation as submitted by the caller. The outbox assigns the
/// id, timestamp, and lifecycle fields when the draft is enqueued.
#[derive(Debug, Clone)]
pub struct ActionDraft {
    /// HTTP method of the deferred request.
    pub method: String,
    /// Target URL of the deferred request.
    pub url: String,
    /// Request headers, carried on faith.
    pub headers: Vec<(String, String)>,
    /// Optional JSON request body.
    pub body: Option<serde_json::Value>,
    /// Delivery priority.
    pub priority: ActionPriority,
    /// Retry ceiling override.
    pub max_retries: Option<u32>,
}

impl ActionDraft {
    /// Create a draft with normal priority and no headers or body.
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: Vec::new(),
            body: None,
            priority: ActionPriority::Normal,
            max_retries: None,
        }
    }

    /// Set the JSON body.
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: ActionPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

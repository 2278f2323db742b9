//! Registry of logical subscriptions.

use crate::{ChannelHandle, ChannelSpec, PushCallback};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Activation status of a logical subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionStatus {
    Subscribed,
    Error,
}

/// The caller's declared intent to receive pushes matching a spec,
/// independent of any specific live channel.
#[derive(Clone)]
pub struct LogicalSubscription {
    /// Opaque subscription token.
    pub id: String,
    /// Channel scope.
    pub spec: ChannelSpec,
    /// Caller-owned push handler.
    pub callback: PushCallback,
    /// Activation status.
    pub status: SubscriptionStatus,
    /// Live channel token; a disposable cache of the entry, safe to
    /// discard and rebuild.
    pub handle: Option<ChannelHandle>,
}

impl std::fmt::Debug for LogicalSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogicalSubscription")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("status", &self.status)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Source of truth for "what should be subscribed".
#[derive(Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<HashMap<String, LogicalSubscription>>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new logical subscription and return its id.
    pub async fn insert(&self, spec: ChannelSpec, callback: PushCallback) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        let entry = LogicalSubscription {
            id: id.clone(),
            spec,
            callback,
            status: SubscriptionStatus::Subscribed,
            handle: None,
        };

        self.entries.write().await.insert(id.clone(), entry);
        debug!(id = %id, "Registered subscription");
        id
    }

    /// Remove an entry, returning it if present.
    pub async fn remove(&self, id: &str) -> Option<LogicalSubscription> {
        self.entries.write().await.remove(id)
    }

    /// Remove and return every entry.
    pub async fn drain(&self) -> Vec<LogicalSubscription> {
        let mut entries = self.entries.write().await;
        entries.drain().map(|(_, entry)| entry).collect()
    }

    /// Replace an entry's handle and mark it subscribed, as a unit.
    pub async fn replace_handle(&self, id: &str, handle: ChannelHandle) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.handle = Some(handle);
            entry.status = SubscriptionStatus::Subscribed;
        }
    }

    /// Drop an entry's handle and mark it errored.
    pub async fn mark_error(&self, id: &str) {
        if let Some(entry) = self.entries.write().await.get_mut(id) {
            entry.handle = None;
            entry.status = SubscriptionStatus::Error;
        }
    }

    /// Snapshot of every entry.
    pub async fn snapshot(&self) -> Vec<LogicalSubscription> {
        self.entries.read().await.values().cloned().collect()
    }

    /// Look up one entry.
    pub async fn get(&self, id: &str) -> Option<LogicalSubscription> {
        self.entries.read().await.get(id).cloned()
    }

    /// Number of registered entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the registry is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

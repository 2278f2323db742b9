//! Durable outbox: write-ahead persistence plus ordered replay.

use crate::action::DEFAULT_MAX_RETRIES;
use crate::{ActionDraft, ApiGateway, OutboxError, OutboxResult};
use chrono::{DateTime, Utc};
use dossier_database::{ActionStatus, Database, QueuedAction};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outbox configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Retry ceiling applied when a draft does not override it.
    pub default_max_retries: u32,
    /// Whether the outbox assumes connectivity until told otherwise.
    pub start_online: bool,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            default_max_retries: DEFAULT_MAX_RETRIES,
            start_online: true,
        }
    }
}

/// Durable queue of client-initiated writes.
///
/// Every action is persisted before it becomes visible in memory, so the
/// in-memory view always converges to the durable one after a crash. The
/// queue drains strictly sequentially, highest priority first, FIFO within
/// a priority class.
pub struct Outbox {
    db: Arc<Database>,
    gateway: Arc<dyn ApiGateway>,
    config: OutboxConfig,
    actions: RwLock<HashMap<String, QueuedAction>>,
    is_online: AtomicBool,
    is_processing: AtomicBool,
    last_sync_time: RwLock<Option<DateTime<Utc>>>,
}

impl Outbox {
    /// Create a new outbox over the given store and gateway.
    pub fn new(db: Arc<Database>, gateway: Arc<dyn ApiGateway>, config: OutboxConfig) -> Self {
        let start_online = config.start_online;
        Self {
            db,
            gateway,
            config,
            actions: RwLock::new(HashMap::new()),
            is_online: AtomicBool::new(start_online),
            is_processing: AtomicBool::new(false),
            last_sync_time: RwLock::new(None),
        }
    }

    /// Bootstrap: load the full durable store into memory.
    ///
    /// Returns the number of actions recovered.
    pub async fn load(&self) -> OutboxResult<usize> {
        let persisted = self.db.get_all_actions()?;
        let count = persisted.len();

        let mut actions = self.actions.write().await;
        actions.clear();
        for action in persisted {
            actions.insert(action.id.clone(), action);
        }

        info!(count, "Recovered queued actions from durable store");
        Ok(count)
    }

    /// Enqueue a new action. The durable write happens first; a persistence
    /// failure is returned to the caller and leaves memory untouched.
    pub async fn add_action(&self, draft: ActionDraft) -> OutboxResult<QueuedAction> {
        let action = QueuedAction {
            id: uuid::Uuid::new_v4().to_string(),
            method: draft.method,
            url: draft.url,
            headers: draft.headers,
            body: draft.body,
            priority: draft.priority,
            timestamp: Utc::now(),
            retry_count: 0,
            max_retries: draft.max_retries.unwrap_or(self.config.default_max_retries),
            status: ActionStatus::Pending,
            error: None,
        };

        self.db.put_action(&action)?;

        let mut actions = self.actions.write().await;
        actions.insert(action.id.clone(), action.clone());

        debug!(id = %action.id, priority = action.priority.as_str(), "Enqueued action");
        Ok(action)
    }

    /// Remove an action from the durable store, then from memory.
    /// No-op if absent.
    pub async fn remove_action(&self, id: &str) -> OutboxResult<()> {
        self.db.delete_action(id)?;
        self.actions.write().await.remove(id);
        Ok(())
    }

    /// Rewrite an action's status (and error) durably, then in memory.
    pub async fn update_action_status(
        &self,
        id: &str,
        status: ActionStatus,
        error: Option<String>,
    ) -> OutboxResult<()> {
        let mut updated = {
            let actions = self.actions.read().await;
            actions
                .get(id)
                .cloned()
                .ok_or_else(|| OutboxError::ActionNotFound(id.to_string()))?
        };

        updated.status = status;
        updated.error = error;

        self.db.put_action(&updated)?;
        self.actions.write().await.insert(id.to_string(), updated);
        Ok(())
    }

    /// Drain the pending queue, highest priority first, FIFO within a
    /// priority class. No-op while offline or while another pass runs.
    ///
    /// Each execution failure is contained: the action is marked failed
    /// with the captured error and the pass continues.
    pub async fn process_queue(&self) -> OutboxResult<()> {
        if !self.is_online.load(Ordering::SeqCst) {
            debug!("Offline, skipping queue pass");
            return Ok(());
        }
        if self
            .is_processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Queue pass already running");
            return Ok(());
        }

        let result = self.run_pass().await;

        *self.last_sync_time.write().await = Some(Utc::now());
        self.is_processing.store(false, Ordering::SeqCst);
        result
    }

    async fn run_pass(&self) -> OutboxResult<()> {
        // The pending set is materialized once; actions enqueued mid-pass
        // wait for the next pass.
        let mut pending: Vec<QueuedAction> = {
            let actions = self.actions.read().await;
            actions
                .values()
                .filter(|a| a.status == ActionStatus::Pending)
                .cloned()
                .collect()
        };
        pending.sort_by(|a, b| {
            a.priority
                .rank()
                .cmp(&b.priority.rank())
                .then(a.timestamp.cmp(&b.timestamp))
        });

        if pending.is_empty() {
            return Ok(());
        }
        info!(count = pending.len(), "Processing queue");

        // Strictly sequential: never two actions in flight.
        for action in pending {
            match self.gateway.execute(&action).await {
                Ok(()) => {
                    self.update_action_status(&action.id, ActionStatus::Completed, None)
                        .await?;
                    self.remove_action(&action.id).await?;
                    debug!(id = %action.id, "Action delivered");
                }
                Err(e) => {
                    warn!(id = %action.id, error = %e, "Action execution failed");
                    self.update_action_status(&action.id, ActionStatus::Failed, Some(e.to_string()))
                        .await?;
                }
            }
        }

        Ok(())
    }

    /// Reset every retryable failed action to pending with an incremented
    /// retry count. Does not itself trigger execution.
    pub async fn retry_failed(&self) -> OutboxResult<usize> {
        let retryable: Vec<QueuedAction> = {
            let actions = self.actions.read().await;
            actions
                .values()
                .filter(|a| a.status == ActionStatus::Failed && a.retry_count < a.max_retries)
                .cloned()
                .collect()
        };

        let count = retryable.len();
        for mut action in retryable {
            action.status = ActionStatus::Pending;
            action.retry_count += 1;
            action.error = None;

            self.db.put_action(&action)?;
            self.actions
                .write()
                .await
                .insert(action.id.clone(), action);
        }

        if count > 0 {
            info!(count, "Reset failed actions for retry");
        }
        Ok(count)
    }

    /// Purge every completed action from the durable store and memory.
    pub async fn clear_completed(&self) -> OutboxResult<usize> {
        let removed = self.db.delete_completed()?;
        self.actions
            .write()
            .await
            .retain(|_, a| a.status != ActionStatus::Completed);

        if removed > 0 {
            debug!(removed, "Cleared completed actions");
        }
        Ok(removed)
    }

    /// Update the connectivity flag; a transition to online immediately
    /// triggers a queue pass.
    pub async fn set_online_status(&self, is_online: bool) -> OutboxResult<()> {
        let was_online = self.is_online.swap(is_online, Ordering::SeqCst);
        if is_online == was_online {
            return Ok(());
        }

        info!(is_online, "Connectivity changed");
        if is_online {
            self.process_queue().await?;
        }
        Ok(())
    }

    /// Whether the outbox currently believes it is online.
    pub fn is_online(&self) -> bool {
        self.is_online.load(Ordering::SeqCst)
    }

    /// Whether a queue pass is currently running.
    pub fn is_processing(&self) -> bool {
        self.is_processing.load(Ordering::SeqCst)
    }

    /// Time the last queue pass finished, if any.
    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync_time.read().await
    }

    /// Number of pending actions.
    pub async fn pending_count(&self) -> usize {
        self.count_by_status(ActionStatus::Pending).await
    }

    /// Number of failed actions.
    pub async fn failed_count(&self) -> usize {
        self.count_by_status(ActionStatus::Failed).await
    }

    async fn count_by_status(&self, status: ActionStatus) -> usize {
        let actions = self.actions.read().await;
        actions.values().filter(|a| a.status == status).count()
    }

    /// Snapshot of every action, oldest first.
    pub async fn actions(&self) -> Vec<QueuedAction> {
        let actions = self.actions.read().await;
        let mut snapshot: Vec<QueuedAction> = actions.values().cloned().collect();
        snapshot.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        snapshot
    }
}

//! Bridges platform online/offline signals into the outbox.

use crate::Outbox;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Forwards edge-triggered connectivity changes to the outbox.
///
/// Subscribes once for the tracker's lifetime; holds no state beyond the
/// forwarding task.
pub struct ConnectivityTracker {
    task: JoinHandle<()>,
}

impl ConnectivityTracker {
    /// Spawn the forwarding task. The current signal value is applied
    /// immediately, then every subsequent edge is forwarded.
    pub fn spawn(outbox: Arc<Outbox>, mut signal: watch::Receiver<bool>) -> Self {
        let task = tokio::spawn(async move {
            loop {
                let is_online = *signal.borrow_and_update();
                debug!(is_online, "Connectivity signal");
                if let Err(e) = outbox.set_online_status(is_online).await {
                    warn!(error = %e, "Failed to apply connectivity change");
                }
                if signal.changed().await.is_err() {
                    break;
                }
            }
        });

        Self { task }
    }

    /// Stop forwarding connectivity changes.
    pub fn dispose(&self) {
        self.task.abort();
    }
}

impl Drop for ConnectivityTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

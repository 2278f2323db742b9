//! Public facade for the realtime reconciler.

use crate::{
    ChannelSpec, ConnectionState, ConnectionSupervisor, PushCallback, RealtimeConfig,
    RealtimeResult, RealtimeTransport, SubscriptionRegistry,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

/// Realtime client: logical subscriptions plus supervised connectivity.
///
/// Callers declare what they want pushed via [`subscribe`](Self::subscribe)
/// and never touch channel handles; reconnects rebuild the live channels
/// transparently.
pub struct RealtimeClient {
    transport: Arc<dyn RealtimeTransport>,
    registry: Arc<SubscriptionRegistry>,
    supervisor: Arc<ConnectionSupervisor>,
}

impl RealtimeClient {
    /// Create a new client over the given transport.
    pub fn new(transport: Arc<dyn RealtimeTransport>, config: RealtimeConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let supervisor =
            ConnectionSupervisor::new(Arc::clone(&transport), Arc::clone(&registry), config);

        Self {
            transport,
            registry,
            supervisor,
        }
    }

    /// Start connection supervision. Re-initializing cancels any listeners
    /// from a previous start.
    pub async fn init(&self) {
        self.supervisor.start().await;
    }

    /// Register a subscription and return its id immediately; the channel
    /// is activated asynchronously and the entry's status reflects the
    /// transport's acknowledgement.
    pub async fn subscribe(&self, spec: ChannelSpec, callback: PushCallback) -> String {
        let id = self.registry.insert(spec.clone(), callback.clone()).await;

        let transport = Arc::clone(&self.transport);
        let registry = Arc::clone(&self.registry);
        let entry_id = id.clone();
        tokio::spawn(async move {
            match transport.open_channel(&spec, callback).await {
                Ok(handle) => {
                    if registry.get(&entry_id).await.is_some() {
                        registry.replace_handle(&entry_id, handle).await;
                        debug!(id = %entry_id, "Subscription active");
                    } else {
                        // Unsubscribed before activation finished.
                        let _ = transport.close_channel(handle).await;
                    }
                }
                Err(e) => {
                    warn!(id = %entry_id, error = %e, "Channel activation failed");
                    registry.mark_error(&entry_id).await;
                }
            }
        });

        id
    }

    /// Tear down a subscription. Idempotent; unknown ids are a no-op.
    pub async fn unsubscribe(&self, id: &str) {
        if let Some(entry) = self.registry.remove(id).await {
            if let Some(handle) = entry.handle {
                let _ = self.transport.close_channel(handle).await;
            }
            debug!(id, "Unsubscribed");
        }
    }

    /// Tear down every subscription.
    pub async fn unsubscribe_all(&self) {
        for entry in self.registry.drain().await {
            if let Some(handle) = entry.handle {
                let _ = self.transport.close_channel(handle).await;
            }
        }
        debug!("Cleared subscription registry");
    }

    /// Force a reconnect pass (single-flight).
    pub async fn reconnect(&self) -> RealtimeResult<()> {
        self.supervisor.reconnect().await
    }

    /// Current connection state snapshot.
    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.supervisor.watch_state()
    }

    /// Number of registered subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.registry.len().await
    }

    /// Stop supervision and tear down every subscription.
    pub async fn dispose(&self) {
        self.supervisor.dispose().await;
        self.unsubscribe_all().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::SubscriptionStatus;
    use dossier_core::BackoffPolicy;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn test_client(transport: Arc<MockTransport>) -> RealtimeClient {
        RealtimeClient::new(
            transport,
            RealtimeConfig {
                poll_interval_ms: 60_000,
                backoff: BackoffPolicy::fixed(10, 100),
            },
        )
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    async fn wait_for_active(client: &RealtimeClient, id: &str) {
        for _ in 0..200 {
            if let Some(entry) = client.registry.get(id).await {
                if entry.handle.is_some() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("subscription never activated");
    }

    #[tokio::test]
    async fn test_subscribe_returns_id_and_activates() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.reconnect().await.unwrap();

        let id = client
            .subscribe(ChannelSpec::new("dossiers", "*"), Arc::new(|_| {}))
            .await;
        assert_eq!(client.subscription_count().await, 1);

        wait_for_active(&client, &id).await;
        let entry = client.registry.get(&id).await.unwrap();
        assert_eq!(entry.status, SubscriptionStatus::Subscribed);
    }

    #[tokio::test]
    async fn test_failed_activation_marks_entry_error() {
        let transport = MockTransport::new();
        transport.fail_open_for("intake_tickets");
        let client = test_client(transport.clone());
        client.reconnect().await.unwrap();

        let id = client
            .subscribe(ChannelSpec::new("intake_tickets", "*"), Arc::new(|_| {}))
            .await;

        let mut errored = false;
        for _ in 0..200 {
            if let Some(entry) = client.registry.get(&id).await {
                if entry.status == SubscriptionStatus::Error {
                    errored = true;
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(errored, "activation failure never recorded");

        // The failed entry stays registered for the next reconnect pass.
        assert_eq!(client.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.reconnect().await.unwrap();

        let id = client
            .subscribe(ChannelSpec::new("dossiers", "*"), Arc::new(|_| {}))
            .await;
        wait_for_active(&client, &id).await;

        client.unsubscribe(&id).await;
        assert_eq!(client.subscription_count().await, 0);

        // Second call and unknown ids must not fail or change anything.
        client.unsubscribe(&id).await;
        client.unsubscribe("unknown").await;
        assert_eq!(client.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_all_closes_channels() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.reconnect().await.unwrap();

        let a = client
            .subscribe(ChannelSpec::new("dossiers", "*"), Arc::new(|_| {}))
            .await;
        let b = client
            .subscribe(ChannelSpec::new("positions", "UPDATE"), Arc::new(|_| {}))
            .await;
        wait_for_active(&client, &a).await;
        wait_for_active(&client, &b).await;

        client.unsubscribe_all().await;

        assert_eq!(client.subscription_count().await, 0);
        assert!(transport.live_handles().is_empty());
        assert_eq!(transport.closed_handles().len(), 2);
    }

    #[tokio::test]
    async fn test_pushes_flow_to_callback_across_reconnect() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.reconnect().await.unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&received);
        let id = client
            .subscribe(
                ChannelSpec::new("dossiers", "UPDATE"),
                Arc::new(move |_event| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .await;
        wait_for_active(&client, &id).await;

        let first_handle = client.registry.get(&id).await.unwrap().handle.unwrap();
        transport.fire_push(first_handle, serde_json::json!({"id": "d-1"}));
        assert_eq!(received.load(Ordering::SeqCst), 1);

        // Drop and reconnect; the fresh handle keeps delivering, the stale
        // one delivers nothing.
        client.reconnect().await.unwrap();
        let second_handle = client.registry.get(&id).await.unwrap().handle.unwrap();
        assert_ne!(first_handle, second_handle);

        transport.fire_push(first_handle, serde_json::json!({"id": "d-2"}));
        assert_eq!(received.load(Ordering::SeqCst), 1);

        transport.fire_push(second_handle, serde_json::json!({"id": "d-3"}));
        assert_eq!(received.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unsubscribe_before_activation_closes_late_channel() {
        let transport = MockTransport::new();
        let client = test_client(transport.clone());
        client.reconnect().await.unwrap();

        let id = client
            .subscribe(ChannelSpec::new("dossiers", "*"), Arc::new(|_| {}))
            .await;
        client.unsubscribe(&id).await;

        // However the activation race resolves, no live channel survives.
        wait_until(move || transport.live_handles().is_empty()).await;
        assert_eq!(client.subscription_count().await, 0);
    }
}

//! Connection health supervision and the reconnection protocol.

use crate::state::map_transport_state;
use crate::{
    ConnectionState, ConnectionStatus, HeartbeatOutcome, RealtimeResult, RealtimeTransport,
    SubscriptionRegistry,
};
use dossier_core::BackoffPolicy;
use futures_util::future::join_all;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Supervisor configuration.
#[derive(Debug, Clone)]
pub struct RealtimeConfig {
    /// Transport-state poll interval in milliseconds.
    pub poll_interval_ms: u64,
    /// Reconnect backoff policy.
    pub backoff: BackoffPolicy,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Maintains the canonical connection state, detects silent failures via
/// heartbeat evidence, and recovers automatically.
///
/// Recovery rebuilds the entire subscription set from the registry, so
/// callers never re-issue subscribe calls after a drop.
pub struct ConnectionSupervisor {
    transport: Arc<dyn RealtimeTransport>,
    registry: Arc<SubscriptionRegistry>,
    config: RealtimeConfig,
    state_tx: watch::Sender<ConnectionState>,
    is_connecting: AtomicBool,
    reconnect_attempts: AtomicU32,
    listeners: Mutex<Vec<JoinHandle<()>>>,
    pending_reconnect: Mutex<Option<JoinHandle<()>>>,
    weak_self: Weak<Self>,
}

impl ConnectionSupervisor {
    /// Create a new supervisor over the given transport and registry.
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        registry: Arc<SubscriptionRegistry>,
        config: RealtimeConfig,
    ) -> Arc<Self> {
        let (state_tx, _) = watch::channel(ConnectionState::default());

        Arc::new_cyclic(|weak| Self {
            transport,
            registry,
            config,
            state_tx,
            is_connecting: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            listeners: Mutex::new(Vec::new()),
            pending_reconnect: Mutex::new(None),
            weak_self: weak.clone(),
        })
    }

    /// Current connection state snapshot.
    pub fn state(&self) -> ConnectionState {
        self.state_tx.borrow().clone()
    }

    /// Observe connection state changes.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Start the poll and heartbeat listeners.
    ///
    /// Re-initializing cancels any previously running listeners first, so
    /// supervisors do not accumulate across restarts.
    pub async fn start(&self) {
        self.stop_listeners().await;

        self.apply_transport_state();

        let Some(supervisor) = self.weak_self.upgrade() else {
            return;
        };

        let poll_supervisor = Arc::clone(&supervisor);
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let poll_task = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            loop {
                ticker.tick().await;
                poll_supervisor.apply_transport_state();
            }
        });

        let heartbeat_supervisor = supervisor;
        let mut heartbeats = self.transport.heartbeats();
        let heartbeat_task = tokio::spawn(async move {
            loop {
                match heartbeats.recv().await {
                    Ok(outcome) => heartbeat_supervisor.handle_heartbeat(outcome).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Heartbeat listener lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        let mut listeners = self.listeners.lock().await;
        listeners.push(poll_task);
        listeners.push(heartbeat_task);
    }

    /// Cancel the poll/heartbeat listeners and any pending reconnect.
    pub async fn dispose(&self) {
        self.stop_listeners().await;
    }

    async fn stop_listeners(&self) {
        let mut listeners = self.listeners.lock().await;
        for task in listeners.drain(..) {
            task.abort();
        }
        if let Some(task) = self.pending_reconnect.lock().await.take() {
            task.abort();
        }
    }

    /// Map the transport's low-level state into the canonical enum.
    fn apply_transport_state(&self) {
        let status = map_transport_state(self.transport.connection_state());
        self.state_tx.send_modify(|state| {
            state.status = status;
            if status == ConnectionStatus::Connected {
                state.last_error = None;
            }
        });
    }

    /// Fold one heartbeat outcome into the canonical state.
    async fn handle_heartbeat(&self, outcome: HeartbeatOutcome) {
        match outcome {
            HeartbeatOutcome::Ok => {
                self.state_tx.send_modify(|state| {
                    state.status = ConnectionStatus::Connected;
                    state.last_error = None;
                });
            }
            HeartbeatOutcome::Sent => {
                self.state_tx.send_modify(|state| {
                    state.status = ConnectionStatus::Connecting;
                });
            }
            HeartbeatOutcome::Timeout
            | HeartbeatOutcome::Error
            | HeartbeatOutcome::Disconnected => {
                let message = format!("heartbeat failure: {outcome:?}");
                warn!(outcome = ?outcome, "Heartbeat failure");
                self.state_tx.send_modify(|state| {
                    state.status = ConnectionStatus::Error;
                    state.last_error = Some(message.clone());
                });
                self.schedule_reconnect().await;
            }
        }
    }

    /// Schedule a reconnect attempt after the backoff delay. At most one
    /// attempt is pending at a time.
    ///
    /// Returns a boxed `Send` future so the recursive `reconnect` ->
    /// `schedule_reconnect` -> spawn(`reconnect`) cycle has an explicit
    /// `Send` type at the recursion point, which the compiler needs to
    /// resolve the auto-trait inference.
    fn schedule_reconnect(&self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            let Some(supervisor) = self.weak_self.upgrade() else {
                return;
            };

            let attempt = self.reconnect_attempts.load(Ordering::SeqCst);
            let delay = self.config.backoff.delay_for(attempt);
            info!(attempt, delay_ms = delay.as_millis() as u64, "Scheduling reconnect");

            let task = tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                if let Err(e) = supervisor.reconnect().await {
                    error!(error = %e, "Reconnect attempt failed");
                }
            });

            let mut pending = self.pending_reconnect.lock().await;
            if let Some(previous) = pending.replace(task) {
                previous.abort();
            }
        })
    }

    /// Re-establish the transport connection and rebuild every registered
    /// subscription. Single-flight: a call while one is already running
    /// returns immediately.
    ///
    /// On failure the logical registry entries stay intact; only live
    /// channel handles are lost, and the next attempt rebuilds them.
    pub async fn reconnect(&self) -> RealtimeResult<()> {
        if self
            .is_connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Reconnect already in flight");
            return Ok(());
        }

        self.state_tx.send_modify(|state| {
            state.status = ConnectionStatus::Reconnecting;
        });
        info!("Reconnecting transport");

        match self.transport.connect().await {
            Ok(()) => {
                self.resubscribe_all().await;
                self.reconnect_attempts.store(0, Ordering::SeqCst);
                self.state_tx.send_modify(|state| {
                    state.status = ConnectionStatus::Connected;
                    state.last_error = None;
                });
                info!("Transport reconnected");
                self.is_connecting.store(false, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                error!(error = %message, "Transport reconnect failed");
                self.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                self.state_tx.send_modify(|state| {
                    state.status = ConnectionStatus::Error;
                    state.last_error = Some(message);
                });
                self.is_connecting.store(false, Ordering::SeqCst);
                self.schedule_reconnect().await;
                Err(e)
            }
        }
    }

    /// Open a fresh channel for every registry entry and swap it in.
    /// Entries are rebuilt independently; one failure marks only that
    /// entry errored.
    async fn resubscribe_all(&self) {
        let entries = self.registry.snapshot().await;
        if entries.is_empty() {
            return;
        }
        info!(count = entries.len(), "Re-establishing subscriptions");

        join_all(entries.into_iter().map(|entry| {
            let transport = Arc::clone(&self.transport);
            let registry = Arc::clone(&self.registry);
            async move {
                if let Some(stale) = entry.handle {
                    let _ = transport.close_channel(stale).await;
                }
                match transport
                    .open_channel(&entry.spec, entry.callback.clone())
                    .await
                {
                    Ok(handle) => {
                        registry.replace_handle(&entry.id, handle).await;
                        debug!(id = %entry.id, "Subscription re-established");
                    }
                    Err(e) => {
                        warn!(id = %entry.id, error = %e, "Resubscription failed");
                        registry.mark_error(&entry.id).await;
                    }
                }
            }
        }))
        .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;
    use crate::{ChannelHandle, ChannelSpec, SubscriptionStatus, TransportState};
    use std::collections::HashSet;

    fn test_config() -> RealtimeConfig {
        RealtimeConfig {
            poll_interval_ms: 60_000,
            backoff: BackoffPolicy::fixed(10, 100),
        }
    }

    fn supervisor_with(
        transport: Arc<MockTransport>,
        config: RealtimeConfig,
    ) -> (Arc<ConnectionSupervisor>, Arc<SubscriptionRegistry>) {
        let registry = Arc::new(SubscriptionRegistry::new());
        let supervisor = ConnectionSupervisor::new(transport, Arc::clone(&registry), config);
        (supervisor, registry)
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

    #[tokio::test]
    async fn test_poll_maps_transport_state() {
        let transport = MockTransport::new();
        let (supervisor, _registry) = supervisor_with(
            transport.clone(),
            RealtimeConfig {
                poll_interval_ms: 20,
                backoff: BackoffPolicy::fixed(10, 100),
            },
        );

        transport.set_state(TransportState::Open);
        supervisor.start().await;

        let s = supervisor.clone();
        wait_until(move || s.state().status == ConnectionStatus::Connected).await;

        transport.set_state(TransportState::Closed);
        let s = supervisor.clone();
        wait_until(move || s.state().status == ConnectionStatus::Disconnected).await;

        transport.set_state(TransportState::Connecting);
        let s = supervisor.clone();
        wait_until(move || s.state().status == ConnectionStatus::Reconnecting).await;

        supervisor.dispose().await;
    }

    #[tokio::test]
    async fn test_heartbeat_evidence_updates_state() {
        let transport = MockTransport::new();
        let (supervisor, _registry) = supervisor_with(transport.clone(), test_config());
        supervisor.start().await;

        transport.emit_heartbeat(HeartbeatOutcome::Sent);
        let s = supervisor.clone();
        wait_until(move || s.state().status == ConnectionStatus::Connecting).await;

        transport.emit_heartbeat(HeartbeatOutcome::Ok);
        let s = supervisor.clone();
        wait_until(move || s.state().status == ConnectionStatus::Connected).await;
        assert_eq!(supervisor.state().last_error, None);

        supervisor.dispose().await;
    }

    #[tokio::test]
    async fn test_heartbeat_timeout_sets_error_and_reconnects() {
        let transport = MockTransport::new();
        let (supervisor, _registry) = supervisor_with(transport.clone(), test_config());
        supervisor.start().await;

        transport.emit_heartbeat(HeartbeatOutcome::Timeout);

        // The failure is recorded, then the scheduled attempt fires after
        // the (tiny) backoff delay and succeeds.
        let t = transport.clone();
        wait_until(move || t.connect_attempts() >= 1).await;

        let s = supervisor.clone();
        wait_until(move || s.state().status == ConnectionStatus::Connected).await;
        assert_eq!(supervisor.state().last_error, None);

        supervisor.dispose().await;
    }

    #[tokio::test]
    async fn test_heartbeat_failure_records_last_error() {
        let transport = MockTransport::new();
        // Connect attempts fail, so the error state persists for inspection.
        transport.set_fail_connect(true);
        let (supervisor, _registry) = supervisor_with(transport.clone(), test_config());
        supervisor.start().await;

        transport.emit_heartbeat(HeartbeatOutcome::Timeout);

        let s = supervisor.clone();
        wait_until(move || {
            let state = s.state();
            state.status == ConnectionStatus::Error
                && state
                    .last_error
                    .as_deref()
                    .is_some_and(|e| e.contains("heartbeat") || e.contains("refused"))
        })
        .await;

        supervisor.dispose().await;
    }

    #[tokio::test]
    async fn test_reconnect_is_single_flight() {
        let transport = MockTransport::new();
        transport.set_connect_delay(Duration::from_millis(50));
        let (supervisor, _registry) = supervisor_with(transport.clone(), test_config());

        let first = {
            let s = supervisor.clone();
            tokio::spawn(async move { s.reconnect().await })
        };
        let second = {
            let s = supervisor.clone();
            tokio::spawn(async move { s.reconnect().await })
        };

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();

        assert_eq!(transport.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_reconnect_rebuilds_every_subscription() {
        let transport = MockTransport::new();
        let (supervisor, registry) = supervisor_with(transport.clone(), test_config());

        // Three logical entries holding stale pre-drop handles.
        let mut stale = HashSet::new();
        for (i, table) in ["dossiers", "positions", "commitments"].iter().enumerate() {
            let id = registry
                .insert(ChannelSpec::new(table, "*"), Arc::new(|_| {}))
                .await;
            let handle = ChannelHandle::new(900 + i as u64);
            registry.replace_handle(&id, handle).await;
            stale.insert(handle);
        }

        supervisor.reconnect().await.unwrap();

        let entries = registry.snapshot().await;
        assert_eq!(entries.len(), 3);

        let mut fresh = HashSet::new();
        for entry in &entries {
            assert_eq!(entry.status, SubscriptionStatus::Subscribed);
            let handle = entry.handle.unwrap();
            assert!(!stale.contains(&handle), "stale handle survived reconnect");
            fresh.insert(handle);
        }
        // Distinct, non-reused handles.
        assert_eq!(fresh.len(), 3);
        assert_eq!(supervisor.state().status, ConnectionStatus::Connected);
    }

    #[tokio::test]
    async fn test_one_resubscription_failure_marks_only_that_entry() {
        let transport = MockTransport::new();
        transport.fail_open_for("positions");
        let (supervisor, registry) = supervisor_with(transport.clone(), test_config());

        for table in ["dossiers", "positions", "commitments"] {
            registry
                .insert(ChannelSpec::new(table, "*"), Arc::new(|_| {}))
                .await;
        }

        supervisor.reconnect().await.unwrap();

        for entry in registry.snapshot().await {
            if entry.spec.table == "positions" {
                assert_eq!(entry.status, SubscriptionStatus::Error);
                assert_eq!(entry.handle, None);
            } else {
                assert_eq!(entry.status, SubscriptionStatus::Subscribed);
                assert!(entry.handle.is_some());
            }
        }
    }

    #[tokio::test]
    async fn test_reconnect_failure_keeps_registry_intact() {
        let transport = MockTransport::new();
        transport.set_fail_connect(true);
        let (supervisor, registry) = supervisor_with(transport.clone(), test_config());

        for table in ["dossiers", "positions"] {
            registry
                .insert(ChannelSpec::new(table, "*"), Arc::new(|_| {}))
                .await;
        }

        let result = supervisor.reconnect().await;
        assert!(result.is_err());

        let state = supervisor.state();
        assert_eq!(state.status, ConnectionStatus::Error);
        assert!(state.last_error.is_some());
        assert_eq!(registry.len().await, 2);

        // Cancel the self-scheduled retry before the test ends.
        supervisor.dispose().await;
    }

    #[tokio::test]
    async fn test_dispose_cancels_listeners() {
        let transport = MockTransport::new();
        let (supervisor, _registry) = supervisor_with(transport.clone(), test_config());

        supervisor.start().await;
        supervisor.dispose().await;

        transport.emit_heartbeat(HeartbeatOutcome::Timeout);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(transport.connect_attempts(), 0);
    }

    #[tokio::test]
    async fn test_restart_does_not_accumulate_listeners() {
        let transport = MockTransport::new();
        let (supervisor, _registry) = supervisor_with(transport.clone(), test_config());

        supervisor.start().await;
        supervisor.start().await;
        supervisor.start().await;

        assert_eq!(supervisor.listeners.lock().await.len(), 2);
        supervisor.dispose().await;
    }
}

//! Transport test double shared by supervisor and client tests.

use crate::{
    ChannelHandle, ChannelSpec, HeartbeatOutcome, PushCallback, PushEvent, RealtimeError,
    RealtimeResult, RealtimeTransport, TransportState,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::broadcast;

/// Scriptable in-memory transport.
pub(crate) struct MockTransport {
    state: RwLock<TransportState>,
    connect_attempts: AtomicUsize,
    fail_connect: AtomicBool,
    connect_delay: RwLock<Duration>,
    next_handle: AtomicU64,
    live: Mutex<HashMap<u64, (ChannelSpec, PushCallback)>>,
    closed: Mutex<Vec<u64>>,
    fail_open_tables: Mutex<HashSet<String>>,
    heartbeat_tx: broadcast::Sender<HeartbeatOutcome>,
}

impl MockTransport {
    pub(crate) fn new() -> Arc<Self> {
        let (heartbeat_tx, _) = broadcast::channel(16);
        Arc::new(Self {
            state: RwLock::new(TransportState::Closed),
            connect_attempts: AtomicUsize::new(0),
            fail_connect: AtomicBool::new(false),
            connect_delay: RwLock::new(Duration::ZERO),
            next_handle: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
            closed: Mutex::new(Vec::new()),
            fail_open_tables: Mutex::new(HashSet::new()),
            heartbeat_tx,
        })
    }

    pub(crate) fn set_state(&self, state: TransportState) {
        *self.state.write().unwrap() = state;
    }

    pub(crate) fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.write().unwrap() = delay;
    }

    pub(crate) fn fail_open_for(&self, table: &str) {
        self.fail_open_tables
            .lock()
            .unwrap()
            .insert(table.to_string());
    }

    pub(crate) fn connect_attempts(&self) -> usize {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    pub(crate) fn emit_heartbeat(&self, outcome: HeartbeatOutcome) {
        let _ = self.heartbeat_tx.send(outcome);
    }

    pub(crate) fn live_handles(&self) -> Vec<u64> {
        self.live.lock().unwrap().keys().copied().collect()
    }

    pub(crate) fn closed_handles(&self) -> Vec<u64> {
        self.closed.lock().unwrap().clone()
    }

    /// Deliver a push to the callback registered for a live channel.
    pub(crate) fn fire_push(&self, handle: ChannelHandle, payload: serde_json::Value) {
        let callback = self
            .live
            .lock()
            .unwrap()
            .get(&handle.id())
            .map(|(spec, cb)| (spec.clone(), cb.clone()));
        if let Some((spec, callback)) = callback {
            callback(PushEvent {
                table: spec.table,
                event: spec.event,
                payload,
            });
        }
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    async fn connect(&self) -> RealtimeResult<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = *self.connect_delay.read().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.fail_connect.load(Ordering::SeqCst) {
            self.set_state(TransportState::Closed);
            return Err(RealtimeError::Transport("connection refused".to_string()));
        }

        // A fresh socket: channels do not survive.
        self.live.lock().unwrap().clear();
        self.set_state(TransportState::Open);
        Ok(())
    }

    async fn open_channel(
        &self,
        spec: &ChannelSpec,
        on_push: PushCallback,
    ) -> RealtimeResult<ChannelHandle> {
        if self.connection_state() != TransportState::Open {
            return Err(RealtimeError::NotConnected);
        }
        if self.fail_open_tables.lock().unwrap().contains(&spec.table) {
            return Err(RealtimeError::Subscription(format!(
                "channel rejected: {}",
                spec.table
            )));
        }

        let id = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.live.lock().unwrap().insert(id, (spec.clone(), on_push));
        Ok(ChannelHandle::new(id))
    }

    async fn close_channel(&self, handle: ChannelHandle) -> RealtimeResult<()> {
        self.live.lock().unwrap().remove(&handle.id());
        self.closed.lock().unwrap().push(handle.id());
        Ok(())
    }

    fn connection_state(&self) -> TransportState {
        *self.state.read().unwrap()
    }

    fn heartbeats(&self) -> broadcast::Receiver<HeartbeatOutcome> {
        self.heartbeat_tx.subscribe()
    }
}

//! Transport seam between the reconciler and a concrete push transport.

use crate::RealtimeResult;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Low-level transport connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    Open,
    Connecting,
    Closing,
    Closed,
}

/// Heartbeat evidence emitted by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Ack received.
    Ok,
    /// Heartbeat sent, ack outstanding.
    Sent,
    /// Ack deadline elapsed.
    Timeout,
    /// Send failed.
    Error,
    /// Transport reported itself gone.
    Disconnected,
}

/// Scope of one push channel: which table/event pairs to receive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelSpec {
    /// Table (topic) to watch.
    pub table: String,
    /// Event filter, e.g. "INSERT", "UPDATE", or "*".
    pub event: String,
    /// Optional row filter expression.
    pub filter: Option<String>,
}

impl ChannelSpec {
    /// Create a spec without a row filter.
    pub fn new(table: &str, event: &str) -> Self {
        Self {
            table: table.to_string(),
            event: event.to_string(),
            filter: None,
        }
    }

    /// Set the row filter.
    pub fn with_filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }
}

/// Opaque token for one live channel. Disposable: replaced wholesale on
/// every reconnect, never the source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    /// Wrap a raw channel id.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Raw channel id.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// A push delivered to a subscription callback.
#[derive(Debug, Clone)]
pub struct PushEvent {
    /// Table the change happened in.
    pub table: String,
    /// Event kind.
    pub event: String,
    /// Change payload, uninterpreted.
    pub payload: serde_json::Value,
}

/// Callback invoked for each matching push.
pub type PushCallback = Arc<dyn Fn(PushEvent) + Send + Sync>;

/// A concrete push transport.
///
/// The supervisor and registry depend only on this interface, never on a
/// specific transport implementation.
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// (Re-)establish the top-level connection.
    async fn connect(&self) -> RealtimeResult<()>;

    /// Open and activate a channel; resolves once the transport acks the
    /// activation.
    async fn open_channel(
        &self,
        spec: &ChannelSpec,
        on_push: PushCallback,
    ) -> RealtimeResult<ChannelHandle>;

    /// Deactivate a channel. Idempotent; closing an unknown handle is a
    /// no-op.
    async fn close_channel(&self, handle: ChannelHandle) -> RealtimeResult<()>;

    /// Current low-level connection state.
    fn connection_state(&self) -> TransportState;

    /// Subscribe to heartbeat outcomes.
    fn heartbeats(&self) -> broadcast::Receiver<HeartbeatOutcome>;
}

//! Canonical connection state.

use crate::TransportState;
use serde::{Deserialize, Serialize};

/// Canonical connection status, decoupled from whatever the underlying
/// transport reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Error,
}

/// Connection state snapshot published to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionState {
    /// Canonical status.
    pub status: ConnectionStatus,
    /// Most recent failure message, cleared once connected.
    pub last_error: Option<String>,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_error: None,
        }
    }
}

impl ConnectionState {
    /// Whether the connection is established.
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Whether a connection attempt is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
        )
    }
}

/// Map the transport's low-level state into the canonical status.
pub(crate) fn map_transport_state(state: TransportState) -> ConnectionStatus {
    match state {
        TransportState::Open => ConnectionStatus::Connected,
        TransportState::Connecting => ConnectionStatus::Reconnecting,
        TransportState::Closing | TransportState::Closed => ConnectionStatus::Disconnected,
    }
}

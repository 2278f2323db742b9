//! Wire frames for the WebSocket push transport.

use crate::ChannelSpec;
use serde::{Deserialize, Serialize};

/// Frame types exchanged with the push endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameType {
    // Channel lifecycle
    Join,
    Joined,
    Leave,
    Left,

    // Keepalive
    Heartbeat,
    HeartbeatAck,

    // Data
    Push,
    Error,
}

/// A frame sent to or received from the push endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: FrameType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Frame {
    /// Create a frame of the given type with a fresh timestamp.
    pub fn new(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            channel_id: None,
            table: None,
            event: None,
            filter: None,
            payload: None,
            error: None,
            success: None,
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// Create a JOIN frame for a channel scoped to the given spec.
    pub fn join(channel_id: u64, spec: &ChannelSpec) -> Self {
        Self {
            channel_id: Some(channel_id),
            table: Some(spec.table.clone()),
            event: Some(spec.event.clone()),
            filter: spec.filter.clone(),
            ..Self::new(FrameType::Join)
        }
    }

    /// Create a LEAVE frame for a channel.
    pub fn leave(channel_id: u64) -> Self {
        Self {
            channel_id: Some(channel_id),
            ..Self::new(FrameType::Leave)
        }
    }

    /// Create a HEARTBEAT frame.
    pub fn heartbeat() -> Self {
        Self::new(FrameType::Heartbeat)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

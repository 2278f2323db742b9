//! Realtime reconciler for push subscriptions.
//!
//! This crate provides:
//! - RealtimeClient: public facade for subscribe/unsubscribe/reconnect
//! - SubscriptionRegistry: logical subscriptions, independent of any live channel
//! - ConnectionSupervisor: health polling, heartbeat evidence, automatic
//!   reconnection with full resubscription
//! - RealtimeTransport: transport seam, with a WebSocket implementation

mod client;
mod error;
mod messages;
mod registry;
mod state;
mod supervisor;
#[cfg(test)]
mod testing;
mod transport;
mod ws;

pub use client::RealtimeClient;
pub use error::{RealtimeError, RealtimeResult};
pub use messages::{Frame, FrameType};
pub use registry::{LogicalSubscription, SubscriptionRegistry, SubscriptionStatus};
pub use state::{ConnectionState, ConnectionStatus};
pub use supervisor::{ConnectionSupervisor, RealtimeConfig};
pub use transport::{
    ChannelHandle, ChannelSpec, HeartbeatOutcome, PushCallback, PushEvent, RealtimeTransport,
    TransportState,
};
pub use ws::{WsConfig, WsTransport};

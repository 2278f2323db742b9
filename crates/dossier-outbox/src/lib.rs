//! Durable outbox for client-initiated writes.
//!
//! This crate provides:
//! - Outbox: durable write-ahead queue with priority/FIFO replay
//! - ApiGateway: execution seam for queued requests, with an HTTP implementation
//! - ConnectivityTracker: bridges online/offline signals into the outbox

mod action;
mod connectivity;
mod error;
mod gateway;
mod outbox;

pub use action::ActionDraft;
pub use connectivity::ConnectivityTracker;
pub use dossier_database::{ActionPriority, ActionStatus, QueuedAction};
pub use error::{OutboxError, OutboxResult};
pub use gateway::{ApiGateway, GatewayConfig, HttpGateway};
pub use outbox::{Outbox, OutboxConfig};

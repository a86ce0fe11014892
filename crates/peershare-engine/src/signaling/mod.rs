//! Signaling: the channel seam, the inbound/outbound adapter, and a
//! WebSocket client for the peershare relay.

mod adapter;
pub mod relay;

pub use adapter::{Inbound, SignalAdapter};
pub use relay::RelaySignaling;

use async_trait::async_trait;
use peershare_common::SignalingError;

use crate::protocol::SignalingMessage;

/// Bidirectional, user-id keyed message channel supplied by the application.
///
/// Only the outbound half is a trait method; inbound messages are pushed into
/// the engine with `handle_signal` / `handle_message`.
#[async_trait]
pub trait SignalingChannel: Send + Sync {
    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError>;
}

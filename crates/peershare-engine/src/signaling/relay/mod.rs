//! WebSocket client for `peershare-relay`.
//!
//! Registers the local user with a hello frame, forwards outbound signaling
//! envelopes, delivers inbound ones on a channel, and reconnects with
//! exponential backoff.

mod client;
mod connection;
mod types;

pub use client::RelaySignaling;
pub use types::ControlFrame;

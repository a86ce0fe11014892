//! Peer Session Engine.
//!
//! A router task maps each peer to a dedicated worker task. Workers run the
//! session state machine (initiate, answer, restart, teardown) one input at
//! a time; different peers proceed concurrently.

mod handle;
mod router;
mod types;
mod worker;


pub use handle::ScreenShareEngine;
pub(crate) use types::PeerInput;
pub use types::{EngineConfig, ScreenShareEvent};

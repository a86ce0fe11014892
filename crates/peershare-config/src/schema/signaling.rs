//! Signaling relay connection settings.

use serde::{Deserialize, Serialize};

/// Configuration for the WebSocket connection to the signaling relay.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// WebSocket URL of the relay (`ws://` or `wss://`).
    pub url: String,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Give up on a single connection attempt after this many seconds.
    pub connect_timeout_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8090".into(),
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            connect_timeout_secs: 15,
        }
    }
}

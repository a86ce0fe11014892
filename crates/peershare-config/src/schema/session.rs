//! Peer session behavior: restart bounds and capture options.

use serde::{Deserialize, Serialize};

/// Bounds on ICE restart after connectivity loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RestartConfig {
    /// Restart attempts before the session is marked failed (valid range: 1-10).
    pub max_attempts: u32,
    /// Seconds to wait for a restart to reconnect (valid range: 1-300).
    pub timeout_secs: u64,
}

impl Default for RestartConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_secs: 15,
        }
    }
}

/// Screen capture options. Video is always requested.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub audio: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self { audio: true }
    }
}

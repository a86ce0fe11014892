//! ICE (STUN/TURN) server configuration.

use serde::{Deserialize, Serialize};

/// A single STUN or TURN server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServerConfig {
    pub fn stun(url: &str) -> Self {
        Self {
            urls: vec![url.to_string()],
            username: None,
            credential: None,
        }
    }

    /// Whether any of the URLs points at a TURN relay.
    pub fn is_turn(&self) -> bool {
        self.urls
            .iter()
            .any(|u| u.starts_with("turn:") || u.starts_with("turns:"))
    }
}

/// ICE configuration handed to the transport capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IceConfig {
    pub servers: Vec<IceServerConfig>,
}

impl Default for IceConfig {
    fn default() -> Self {
        Self {
            servers: vec![
                IceServerConfig::stun("stun:stun.l.google.com:19302"),
                IceServerConfig::stun("stun:stun1.l.google.com:19302"),
            ],
        }
    }
}

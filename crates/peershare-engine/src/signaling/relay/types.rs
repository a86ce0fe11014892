//! Relay control frames and client commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Control Frames
// ---------------------------------------------------------------------------

/// Frames exchanged with the relay outside of signaling envelopes. They are
/// told apart from envelopes by their `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlFrame {
    /// First frame on every connection.
    Hello { user_id: String },
    /// Relay accepted the hello.
    Registered {
        #[serde(default)]
        user_id: Option<String>,
    },
    /// Relay rejected a frame.
    Error { message: String },
}

impl ControlFrame {
    pub(crate) fn hello(user_id: &str) -> Self {
        Self::Hello {
            user_id: user_id.to_string(),
        }
    }
}

/// Classification of an inbound text frame.
#[derive(Debug)]
pub(crate) enum Incoming {
    Control(ControlFrame),
    Envelope(Value),
}

pub(crate) fn classify(text: &str) -> Option<Incoming> {
    let value: Value = serde_json::from_str(text).ok()?;
    if value.get("type").is_some() {
        serde_json::from_value(value).ok().map(Incoming::Control)
    } else {
        Some(Incoming::Envelope(value))
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Commands sent to the connection task.
#[derive(Debug)]
pub(crate) enum RelayCommand {
    Send(Value),
    Disconnect,
}

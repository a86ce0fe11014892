//! Relay-level wire protocol. Control frames carry a `type` field; signaling
//! envelopes do not and are forwarded by their `toUserId`.

use serde::{Deserialize, Serialize};

/// First message a client sends to identify itself.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayHello {
    Hello { user_id: String },
}

/// Messages the relay sends back to clients.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayResponse {
    Registered { user_id: String },
    Error { message: String },
}

impl RelayResponse {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Both variants hold only strings.
        serde_json::to_string(self).unwrap_or_else(|_| String::from(r#"{"type":"error"}"#))
    }
}

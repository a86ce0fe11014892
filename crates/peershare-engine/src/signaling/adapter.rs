//! Translates between wire envelopes and engine-level signals.

use peershare_common::ShareError;
use serde_json::Value;

use crate::protocol::{Signal, SignalingMessage};

/// A decoded inbound signal from one peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub peer_user_id: String,
    pub signal: Signal,
}

#[derive(Debug, Clone)]
pub struct SignalAdapter {
    local_user_id: String,
}

impl SignalAdapter {
    pub fn new(local_user_id: impl Into<String>) -> Self {
        Self {
            local_user_id: local_user_id.into(),
        }
    }

    pub fn local_user_id(&self) -> &str {
        &self.local_user_id
    }

    pub fn decode(&self, value: &Value) -> Result<Inbound, ShareError> {
        let message = SignalingMessage::from_value(value)?;
        self.accept(message)
    }

    /// Check addressing of an already-decoded message.
    pub fn accept(&self, message: SignalingMessage) -> Result<Inbound, ShareError> {
        if message.to_user_id != self.local_user_id {
            return Err(ShareError::SignalingMalformed(format!(
                "addressed to {}, not the local user",
                message.to_user_id
            )));
        }
        if message.from_user_id == self.local_user_id {
            return Err(ShareError::SignalingMalformed(
                "message sent by the local user".into(),
            ));
        }
        Ok(Inbound {
            peer_user_id: message.from_user_id,
            signal: message.signal,
        })
    }

    pub fn outbound(&self, peer_user_id: &str, signal: Signal) -> SignalingMessage {
        SignalingMessage::new(self.local_user_id.as_str(), peer_user_id, signal)
    }
}

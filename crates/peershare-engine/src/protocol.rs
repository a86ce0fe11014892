//! Wire contract for screen-share signaling.
//!
//! Every message is a JSON envelope
//! `{"fromUserId", "toUserId", "kind", "payload"}` relayed between the two
//! users by the signaling channel. Decoding is explicit so that a malformed
//! message can be reported with the exact field that was wrong.

use peershare_common::ShareError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Message kinds
// ---------------------------------------------------------------------------

/// Values of the envelope `kind` field.
pub mod kinds {
    pub const OFFER: &str = "offer";
    pub const ANSWER: &str = "answer";
    pub const ICE_CANDIDATE: &str = "ice-candidate";
    pub const SHARE_STOPPED: &str = "share-stopped";
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

/// A session description (SDP) exchanged during negotiation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// An ICE candidate, in the shape browsers produce with `toJSON()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(
        rename = "sdpMLineIndex",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sdp_m_line_index: Option<u16>,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_m_line_index: None,
        }
    }
}

/// Offer payload. `restart` marks an ICE restart of an existing session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferPayload {
    #[serde(flatten)]
    pub description: SessionDescription,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub restart: bool,
}

// ---------------------------------------------------------------------------
// Signals and envelope
// ---------------------------------------------------------------------------

/// The four signaling message kinds with their payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    Offer(OfferPayload),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    ShareStopped,
}

impl Signal {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Offer(_) => kinds::OFFER,
            Self::Answer(_) => kinds::ANSWER,
            Self::IceCandidate(_) => kinds::ICE_CANDIDATE,
            Self::ShareStopped => kinds::SHARE_STOPPED,
        }
    }

    fn payload(&self) -> Option<Value> {
        let value = match self {
            Self::Offer(offer) => serde_json::to_value(offer),
            Self::Answer(answer) => serde_json::to_value(answer),
            Self::IceCandidate(candidate) => serde_json::to_value(candidate),
            Self::ShareStopped => return None,
        };
        value.ok()
    }
}

/// A signaling message addressed from one user to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalingMessage {
    pub from_user_id: String,
    pub to_user_id: String,
    pub signal: Signal,
}

impl SignalingMessage {
    pub fn new(from: impl Into<String>, to: impl Into<String>, signal: Signal) -> Self {
        Self {
            from_user_id: from.into(),
            to_user_id: to.into(),
            signal,
        }
    }

    /// Encode to the JSON envelope.
    pub fn to_value(&self) -> Value {
        let mut envelope = serde_json::json!({
            "fromUserId": self.from_user_id,
            "toUserId": self.to_user_id,
            "kind": self.signal.kind(),
        });
        if let (Some(payload), Some(obj)) = (self.signal.payload(), envelope.as_object_mut()) {
            obj.insert("payload".to_string(), payload);
        }
        envelope
    }

    /// Decode a JSON envelope, naming the first missing or ill-typed field.
    pub fn from_value(value: &Value) -> Result<Self, ShareError> {
        let obj = value
            .as_object()
            .ok_or_else(|| malformed("envelope is not a JSON object"))?;

        let from_user_id = user_id_field(value, "fromUserId")?;
        let to_user_id = user_id_field(value, "toUserId")?;
        let kind = obj
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing kind"))?;

        let signal = match kind {
            kinds::OFFER => {
                let offer: OfferPayload = payload_field(value, kind)?;
                if offer.description.sdp_type != SdpType::Offer {
                    return Err(malformed("offer payload does not carry an offer"));
                }
                Signal::Offer(offer)
            }
            kinds::ANSWER => {
                let answer: SessionDescription = payload_field(value, kind)?;
                if answer.sdp_type != SdpType::Answer {
                    return Err(malformed("answer payload does not carry an answer"));
                }
                Signal::Answer(answer)
            }
            kinds::ICE_CANDIDATE => Signal::IceCandidate(payload_field(value, kind)?),
            kinds::SHARE_STOPPED => Signal::ShareStopped,
            other => return Err(malformed(format!("unknown kind {other:?}"))),
        };

        Ok(Self {
            from_user_id,
            to_user_id,
            signal,
        })
    }
}

fn malformed(reason: impl Into<String>) -> ShareError {
    ShareError::SignalingMalformed(reason.into())
}

/// User ids are strings, but numeric ids from older clients are accepted.
fn user_id_field(value: &Value, field: &str) -> Result<String, ShareError> {
    let id = match value.get(field) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(_) => return Err(malformed(format!("{field} is not a string"))),
        None => return Err(malformed(format!("missing {field}"))),
    };
    if id.is_empty() {
        return Err(malformed(format!("{field} is empty")));
    }
    Ok(id)
}

fn payload_field<T: serde::de::DeserializeOwned>(value: &Value, kind: &str) -> Result<T, ShareError> {
    let payload = value
        .get("payload")
        .ok_or_else(|| malformed(format!("{kind} is missing its payload")))?;
    serde_json::from_value(payload.clone())
        .map_err(|e| malformed(format!("invalid {kind} payload: {e}")))
}

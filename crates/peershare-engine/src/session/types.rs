//! Role, state, and snapshot types for a peer session.

use peershare_common::SessionId;
use serde::{Deserialize, Serialize};

/// Which side of the offer/answer exchange a session plays. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Produces the offer (the sharer).
    Caller,
    /// Produces the answer (the viewer).
    Callee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Negotiating,
    Connected,
    Reconnecting,
    Failed,
    Closed,
}

impl SessionState {
    /// Failed and Closed are terminal for a session instance.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed)
    }
}

/// Point-in-time view of a peer session, for the UI and for tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub peer_user_id: String,
    pub role: Role,
    pub state: SessionState,
    pub pending_local_candidates: usize,
    pub pending_remote_candidates: usize,
    pub restart_attempts: u32,
    /// Number of local tracks still producing media.
    pub live_local_tracks: usize,
    pub has_transport: bool,
    pub has_remote_media: bool,
}

//! Configuration, UI events, and internal inputs of the engine.

use std::time::Duration;

use peershare_common::{SessionId, ShareError};
use peershare_config::ShareConfig;
use tokio::sync::oneshot;

use crate::capture::RemoteMedia;
use crate::protocol::Signal;
use crate::session::{Role, SessionSnapshot, SessionState};
use crate::transport::TransportEvent;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Request audio alongside the screen video.
    pub capture_audio: bool,
    /// ICE restarts allowed before a session fails.
    pub max_restart_attempts: u32,
    /// How long one restart attempt may take to reconnect.
    pub restart_timeout: Duration,
    /// Capacity of the UI event channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capture_audio: true,
            max_restart_attempts: 3,
            restart_timeout: Duration::from_secs(15),
            event_capacity: 256,
        }
    }
}

impl From<&ShareConfig> for EngineConfig {
    fn from(config: &ShareConfig) -> Self {
        Self {
            capture_audio: config.capture.audio,
            max_restart_attempts: config.restart.max_attempts,
            restart_timeout: Duration::from_secs(config.restart.timeout_secs),
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// UI Events
// ---------------------------------------------------------------------------

/// Observations for the UI collaborator.
#[derive(Debug, Clone, PartialEq)]
pub enum ScreenShareEvent {
    StateChanged {
        peer_user_id: String,
        session_id: SessionId,
        role: Role,
        state: SessionState,
    },
    /// Emitted once per remote track announcement.
    RemoteMediaAvailable {
        peer_user_id: String,
        session_id: SessionId,
        media: RemoteMedia,
    },
    SessionFailed {
        peer_user_id: String,
        session_id: SessionId,
        error: ShareError,
    },
}

// ---------------------------------------------------------------------------
// Internal Inputs
// ---------------------------------------------------------------------------

/// Why a session is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    LocalStop,
    /// The capture source ended (e.g. stopped from the OS picker).
    MediaEnded,
    Cleanup,
    Shutdown,
    /// Peer sent `share-stopped`.
    RemoteStopped,
    /// Superseded by the peer's new offer.
    Replaced,
}

impl CloseReason {
    /// Only locally initiated closes tell the peer.
    pub(crate) fn notifies_peer(self) -> bool {
        matches!(
            self,
            Self::LocalStop | Self::MediaEnded | Self::Cleanup | Self::Shutdown
        )
    }
}

/// Everything a peer worker processes, strictly in arrival order.
#[derive(Debug)]
pub(crate) enum PeerInput {
    StartShare,
    Stop {
        reason: CloseReason,
        ack: Option<oneshot::Sender<()>>,
    },
    Signal(Signal),
    Transport {
        session_id: SessionId,
        event: TransportEvent,
    },
    RestartTimeout {
        session_id: SessionId,
        seq: u64,
    },
    Snapshot(oneshot::Sender<Option<SessionSnapshot>>),
    /// The router accepted the worker's retirement; exit without closing.
    Retire,
    Shutdown(oneshot::Sender<()>),
}

impl PeerInput {
    /// Inputs the worker feeds itself rather than receiving from the router.
    pub(crate) fn is_internal(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::RestartTimeout { .. })
    }
}

/// A worker with no live session offering to exit. Accepted only if the
/// router has sent it nothing beyond the `processed` inputs.
#[derive(Debug)]
pub(crate) struct Retirement {
    pub(crate) peer_user_id: String,
    pub(crate) worker_id: u64,
    pub(crate) processed: u64,
    /// The terminal session, kept so snapshots can still report it.
    pub(crate) snapshot: Option<SessionSnapshot>,
}

/// Commands from engine handles to the router task.
#[derive(Debug)]
pub(crate) enum EngineCommand {
    Peer {
        peer_user_id: String,
        input: PeerInput,
    },
    Snapshot {
        peer_user_id: String,
        reply: oneshot::Sender<Option<SessionSnapshot>>,
    },
    Cleanup(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

//! Transport Capability seam: the runtime's real-time media primitive.
//!
//! The engine never talks to a peer connection implementation directly. It
//! asks a [`TransportFactory`] for one [`Transport`] per peer session and
//! receives asynchronous reports through a [`TransportEventSink`] bound to
//! that session's id.

#[cfg(feature = "webrtc")]
mod rtc;

#[cfg(feature = "webrtc")]
pub use rtc::RtcTransportFactory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use peershare_common::{SessionId, TransportError};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::capture::{LocalMedia, RemoteMedia};
use crate::engine::PeerInput;
use crate::protocol::{IceCandidate, SessionDescription};

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Connectivity as reported by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityState {
    New,
    Checking,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

/// Asynchronous reports from a transport instance.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A locally gathered ICE candidate, ready to be sent to the peer.
    LocalCandidate(IceCandidate),
    Connectivity(ConnectivityState),
    /// The peer's media arrived.
    RemoteTrack(RemoteMedia),
}

/// Delivers transport events into the owning peer's input queue, tagged with
/// the session that created the transport.
#[derive(Clone)]
pub struct TransportEventSink {
    session_id: SessionId,
    tx: mpsc::UnboundedSender<PeerInput>,
}

impl TransportEventSink {
    pub(crate) fn new(session_id: SessionId, tx: mpsc::UnboundedSender<PeerInput>) -> Self {
        Self { session_id, tx }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Returns false once the peer worker is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(PeerInput::Transport {
                session_id: self.session_id.clone(),
                event,
            })
            .is_ok()
    }
}

impl fmt::Debug for TransportEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportEventSink")
            .field("session_id", &self.session_id)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Seam
// ---------------------------------------------------------------------------

/// One peer connection owned by exactly one peer session.
#[async_trait]
pub trait Transport: Send {
    async fn add_local_media(&mut self, media: &LocalMedia) -> Result<(), TransportError>;

    /// Generate an offer. `ice_restart` requests fresh ICE credentials.
    async fn create_offer(&mut self, ice_restart: bool)
        -> Result<SessionDescription, TransportError>;

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError>;

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError>;

    async fn add_remote_candidate(&mut self, candidate: IceCandidate)
        -> Result<(), TransportError>;

    /// Detach every local media sender.
    async fn remove_senders(&mut self) -> Result<(), TransportError>;

    /// Release the connection. No events are emitted afterwards.
    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(
        &self,
        session_id: &SessionId,
        sink: TransportEventSink,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

/// Whether the runtime can do peer-to-peer media at all. Checked once when
/// the engine is built.
#[derive(Clone)]
pub enum TransportCapability {
    Available(Arc<dyn TransportFactory>),
    Unavailable(String),
}

impl TransportCapability {
    pub fn available(factory: impl TransportFactory + 'static) -> Self {
        Self::Available(Arc::new(factory))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }
}

impl fmt::Debug for TransportCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(_) => f.write_str("Available"),
            Self::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

//! Peer-to-peer screen sharing between two users.
//!
//! The [`ScreenShareEngine`] creates, negotiates, monitors, restarts, and
//! tears down one media session per remote peer. It exchanges offers,
//! answers, and ICE candidates over a [`SignalingChannel`] and drives a
//! [`TransportCapability`] supplied by the runtime.
//!
//! - [`candidate_buffer`]: ICE candidates awaiting their session
//! - [`session`]: one peer session and its snapshots
//! - [`engine`]: the state machine and its public handle
//! - [`protocol`]: the signaling wire contract
//! - [`signaling`]: the channel seam and the relay client
//! - [`transport`] / [`capture`]: runtime seams

pub mod candidate_buffer;
pub mod capture;
pub mod engine;
pub mod protocol;
pub mod session;
pub mod signaling;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use capture::{CaptureRequest, LocalMedia, LocalTrack, MediaCapture, RemoteMedia, TrackKind};
pub use engine::{EngineConfig, ScreenShareEngine, ScreenShareEvent};
pub use protocol::{IceCandidate, SessionDescription, Signal, SignalingMessage};
pub use session::{Role, SessionSnapshot, SessionState};
pub use signaling::{RelaySignaling, SignalingChannel};
pub use transport::{
    ConnectivityState, Transport, TransportCapability, TransportEvent, TransportEventSink,
    TransportFactory,
};

#[cfg(feature = "webrtc")]
pub use transport::RtcTransportFactory;

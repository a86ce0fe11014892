//! Peer session: one negotiation or live media relationship with a peer.

mod peer;
mod types;

pub use peer::PeerSession;
pub use types::{Role, SessionSnapshot, SessionState};

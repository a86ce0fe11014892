//! One media session with exactly one remote peer.

use peershare_common::{SessionId, ShareError, TransportError};
use tracing::{debug, warn};

use super::types::{Role, SessionSnapshot, SessionState};
use crate::candidate_buffer::CandidateBuffer;
use crate::capture::{LocalMedia, RemoteMedia};
use crate::protocol::{IceCandidate, SessionDescription};
use crate::transport::Transport;

/// A peer session owns its transport, its local media, and its candidate
/// queues. Only the engine's per-peer worker mutates it.
pub struct PeerSession {
    id: SessionId,
    peer_user_id: String,
    role: Role,
    pub(crate) state: SessionState,
    local_media: Option<LocalMedia>,
    remote_media: Option<RemoteMedia>,
    transport: Option<Box<dyn Transport>>,
    candidates: CandidateBuffer,
    /// The peer has been sent our description; local candidates may flow.
    target_established: bool,
    /// The peer's current description is applied; remote candidates may apply.
    remote_applied: bool,
    local_description: Option<SessionDescription>,
    pub(crate) restart_attempts: u32,
    /// Bumped on every restart attempt so stale timers can be recognized.
    pub(crate) restart_seq: u64,
}

impl PeerSession {
    pub fn new(peer_user_id: impl Into<String>, role: Role) -> Self {
        Self {
            id: SessionId::new(),
            peer_user_id: peer_user_id.into(),
            role,
            state: SessionState::Idle,
            local_media: None,
            remote_media: None,
            transport: None,
            candidates: CandidateBuffer::new(),
            target_established: false,
            remote_applied: false,
            local_description: None,
            restart_attempts: 0,
            restart_seq: 0,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn peer_user_id(&self) -> &str {
        &self.peer_user_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Neither Failed nor Closed.
    pub fn is_live(&self) -> bool {
        !self.state.is_terminal()
    }

    pub fn local_description(&self) -> Option<&SessionDescription> {
        self.local_description.as_ref()
    }

    pub fn remote_media(&self) -> Option<&RemoteMedia> {
        self.remote_media.as_ref()
    }

    pub(crate) fn set_remote_media(&mut self, media: RemoteMedia) {
        self.remote_media = Some(media);
    }

    // -----------------------------------------------------------------------
    // Transport operations
    // -----------------------------------------------------------------------

    pub(crate) fn attach_transport(&mut self, transport: Box<dyn Transport>) {
        self.transport = Some(transport);
    }

    fn transport(&mut self) -> Result<&mut Box<dyn Transport>, ShareError> {
        self.transport
            .as_mut()
            .ok_or_else(|| TransportError::Closed.into())
    }

    /// Take ownership of `media` and attach its tracks to the transport.
    pub(crate) async fn add_local_media(&mut self, media: LocalMedia) -> Result<(), ShareError> {
        let media = self.local_media.insert(media);
        let transport = self
            .transport
            .as_mut()
            .ok_or(ShareError::from(TransportError::Closed))?;
        transport.add_local_media(media).await?;
        Ok(())
    }

    /// Generate an offer and install it as the local description.
    pub(crate) async fn create_local_offer(
        &mut self,
        ice_restart: bool,
    ) -> Result<SessionDescription, ShareError> {
        let transport = self.transport()?;
        let offer = transport.create_offer(ice_restart).await?;
        transport.set_local_description(offer.clone()).await?;
        self.local_description = Some(offer.clone());
        Ok(offer)
    }

    /// Generate an answer to the applied remote offer and install it.
    pub(crate) async fn create_local_answer(&mut self) -> Result<SessionDescription, ShareError> {
        let transport = self.transport()?;
        let answer = transport.create_answer().await?;
        transport.set_local_description(answer.clone()).await?;
        self.local_description = Some(answer.clone());
        Ok(answer)
    }

    /// Apply the peer's description, then every remote candidate buffered
    /// before it, in receipt order.
    pub(crate) async fn apply_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), ShareError> {
        self.transport()?.set_remote_description(description).await?;
        self.remote_applied = true;

        let pending = self.candidates.flush_remote();
        if !pending.is_empty() {
            debug!(session = %self.id, count = pending.len(), "Applying buffered remote candidates");
        }
        for candidate in pending {
            self.add_remote_candidate(candidate).await?;
        }
        Ok(())
    }

    /// Candidates for a new ICE generation wait for the next remote
    /// description.
    pub(crate) fn expect_new_remote_description(&mut self) {
        self.remote_applied = false;
    }

    // -----------------------------------------------------------------------
    // Candidates
    // -----------------------------------------------------------------------

    /// Returns the candidate if it can be sent now, otherwise buffers it.
    pub(crate) fn accept_local_candidate(&mut self, candidate: IceCandidate) -> Option<IceCandidate> {
        if self.target_established {
            Some(candidate)
        } else {
            self.candidates.buffer_local(candidate);
            None
        }
    }

    /// Mark the peer as reachable and drain buffered local candidates.
    pub(crate) fn establish_target(&mut self) -> Vec<IceCandidate> {
        self.target_established = true;
        self.candidates.flush_local()
    }

    /// Apply now if the remote description is in place, otherwise buffer.
    pub(crate) async fn accept_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), ShareError> {
        if self.remote_applied {
            self.add_remote_candidate(candidate).await
        } else {
            self.candidates.buffer_remote(candidate);
            Ok(())
        }
    }

    async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), ShareError> {
        let session = self.id.clone();
        if let Err(e) = self.transport()?.add_remote_candidate(candidate).await {
            // A single bad candidate does not doom the session.
            warn!(session = %session, error = %e, "Remote candidate rejected");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Stop local media, detach senders, close the transport, and clear both
    /// candidate queues. Safe to call more than once.
    pub(crate) async fn release(&mut self) {
        if let Some(media) = self.local_media.take() {
            media.stop();
        }
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.remove_senders().await {
                warn!(session = %self.id, error = %e, "Failed to remove senders");
            }
            if let Err(e) = transport.close().await {
                warn!(session = %self.id, error = %e, "Failed to close transport");
            }
        }
        self.candidates.clear();
        self.remote_media = None;
        self.target_established = false;
        self.remote_applied = false;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            peer_user_id: self.peer_user_id.clone(),
            role: self.role,
            state: self.state,
            pending_local_candidates: self.candidates.pending_local(),
            pending_remote_candidates: self.candidates.pending_remote(),
            restart_attempts: self.restart_attempts,
            live_local_tracks: self
                .local_media
                .as_ref()
                .map_or(0, LocalMedia::live_track_count),
            has_transport: self.transport.is_some(),
            has_remote_media: self.remote_media.is_some(),
        }
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("peer_user_id", &self.peer_user_id)
            .field("role", &self.role)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//! Per-peer worker: runs one peer's session state machine.
//!
//! Each peer gets its own task reading a FIFO of [`PeerInput`]s. An input,
//! including the transport operations it triggers, completes before the next
//! one is looked at, so two transitions never overlap for the same peer.

use std::sync::Arc;

use peershare_common::{SessionId, ShareError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::types::{CloseReason, EngineConfig, PeerInput, Retirement, ScreenShareEvent};
use crate::capture::{CaptureRequest, MediaCapture};
use crate::protocol::{IceCandidate, OfferPayload, SessionDescription, Signal};
use crate::session::{PeerSession, Role, SessionSnapshot, SessionState};
use crate::signaling::{SignalAdapter, SignalingChannel};
use crate::transport::{
    ConnectivityState, TransportEvent, TransportEventSink, TransportFactory,
};

// ---------------------------------------------------------------------------
// Shared collaborators
// ---------------------------------------------------------------------------

/// Collaborators shared by every peer worker of one engine.
pub(crate) struct EngineShared {
    pub(crate) factory: Arc<dyn TransportFactory>,
    pub(crate) capture: Arc<dyn MediaCapture>,
    pub(crate) signaling: Arc<dyn SignalingChannel>,
    pub(crate) adapter: SignalAdapter,
    pub(crate) config: EngineConfig,
    pub(crate) event_tx: mpsc::Sender<ScreenShareEvent>,
}

/// Spawn a worker for `peer_user_id` and return its input queue.
/// `previous` is the snapshot left behind by a retired worker for the same
/// peer.
pub(crate) fn spawn_worker(
    shared: &Arc<EngineShared>,
    peer_user_id: &str,
    worker_id: u64,
    previous: Option<SessionSnapshot>,
    retire_tx: mpsc::UnboundedSender<Retirement>,
) -> mpsc::UnboundedSender<PeerInput> {
    let (input_tx, input_rx) = mpsc::unbounded_channel();
    let worker = PeerWorker {
        ctx: PeerContext {
            shared: Arc::clone(shared),
            peer_user_id: peer_user_id.to_string(),
            self_tx: input_tx.clone(),
        },
        session: None,
        previous,
        worker_id,
        retire_tx,
        processed: 0,
        announced: None,
    };
    tokio::spawn(worker.run(input_rx));
    input_tx
}

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Everything a worker knows besides its session, kept apart so negotiation
/// helpers can borrow it alongside `&mut PeerSession`.
struct PeerContext {
    shared: Arc<EngineShared>,
    peer_user_id: String,
    self_tx: mpsc::UnboundedSender<PeerInput>,
}

impl PeerContext {
    fn local_user_id(&self) -> &str {
        self.shared.adapter.local_user_id()
    }

    /// Never waits on the UI: a full channel drops the event.
    fn emit(&self, event: ScreenShareEvent) {
        match self.shared.event_tx.try_send(event) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(event)) => {
                warn!(peer = %self.peer_user_id, event = ?event, "UI event channel full, dropping event");
            }
        }
    }

    fn transition(&self, session: &mut PeerSession, state: SessionState) {
        if session.state == state {
            return;
        }
        debug!(
            peer = %self.peer_user_id,
            session = %session.id(),
            from = ?session.state,
            to = ?state,
            "Session state change"
        );
        session.state = state;
        self.emit(ScreenShareEvent::StateChanged {
            peer_user_id: self.peer_user_id.clone(),
            session_id: session.id().clone(),
            role: session.role(),
            state,
        });
    }

    async fn send(&self, signal: Signal) -> Result<(), ShareError> {
        let kind = signal.kind();
        let message = self.shared.adapter.outbound(&self.peer_user_id, signal);
        self.shared.signaling.send(message).await?;
        debug!(peer = %self.peer_user_id, kind, "Sent signal");
        Ok(())
    }

    async fn send_candidate(&self, candidate: IceCandidate) {
        if let Err(e) = self.send(Signal::IceCandidate(candidate)).await {
            warn!(peer = %self.peer_user_id, error = %e, "Failed to send local candidate");
        }
    }

    async fn attach_transport(&self, session: &mut PeerSession) -> Result<(), ShareError> {
        let sink = TransportEventSink::new(session.id().clone(), self.self_tx.clone());
        let transport = self.shared.factory.create(session.id(), sink).await?;
        session.attach_transport(transport);
        Ok(())
    }

    /// Caller path: capture, attach, offer, send.
    async fn negotiate_as_caller(&self, session: &mut PeerSession) -> Result<(), ShareError> {
        let request = CaptureRequest::screen(self.shared.config.capture_audio);
        let media = self.shared.capture.capture(request).await?;
        if !media.has_video() {
            return Err(ShareError::MediaAcquisitionDenied(
                "capture produced no video track".into(),
            ));
        }

        self.attach_transport(session).await?;
        session.add_local_media(media).await?;
        let offer = session.create_local_offer(false).await?;
        self.send(Signal::Offer(OfferPayload {
            description: offer,
            restart: false,
        }))
        .await?;

        for candidate in session.establish_target() {
            self.send_candidate(candidate).await;
        }
        Ok(())
    }

    /// Callee path: attach, apply offer, answer, send.
    async fn negotiate_as_callee(
        &self,
        session: &mut PeerSession,
        offer: SessionDescription,
    ) -> Result<(), ShareError> {
        self.attach_transport(session).await?;
        session.apply_remote_description(offer).await?;
        let answer = session.create_local_answer().await?;
        self.send(Signal::Answer(answer)).await?;

        for candidate in session.establish_target() {
            self.send_candidate(candidate).await;
        }
        Ok(())
    }

    /// Answer a restart offer on the existing transport.
    async fn renegotiate(
        &self,
        session: &mut PeerSession,
        offer: SessionDescription,
    ) -> Result<(), ShareError> {
        session.apply_remote_description(offer).await?;
        let answer = session.create_local_answer().await?;
        self.send(Signal::Answer(answer)).await
    }

    /// Caller only: new offer with fresh ICE credentials.
    async fn send_restart_offer(&self, session: &mut PeerSession) -> Result<(), ShareError> {
        let offer = session.create_local_offer(true).await?;
        session.expect_new_remote_description();
        self.send(Signal::Offer(OfferPayload {
            description: offer,
            restart: true,
        }))
        .await
    }

    fn schedule_restart_timeout(&self, session_id: SessionId, seq: u64) {
        let tx = self.self_tx.clone();
        let timeout = self.shared.config.restart_timeout;
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = tx.send(PeerInput::RestartTimeout { session_id, seq });
        });
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// The live session in `slot`, if it is the one `session_id` names.
fn live_session<'a>(
    slot: &'a mut Option<PeerSession>,
    session_id: &SessionId,
) -> Option<&'a mut PeerSession> {
    slot.as_mut()
        .filter(|s| s.is_live() && s.id() == session_id)
}

struct PeerWorker {
    ctx: PeerContext,
    /// The current or most recent session. Terminal sessions stay here so
    /// they can still be observed.
    session: Option<PeerSession>,
    /// Snapshot handed over from a retired worker, shown until a session
    /// starts here.
    previous: Option<SessionSnapshot>,
    worker_id: u64,
    retire_tx: mpsc::UnboundedSender<Retirement>,
    /// Router inputs handled so far.
    processed: u64,
    /// `processed` at the last retirement offer.
    announced: Option<u64>,
}

impl PeerWorker {
    async fn run(mut self, mut input_rx: mpsc::UnboundedReceiver<PeerInput>) {
        while let Some(input) = input_rx.recv().await {
            if !input.is_internal() {
                self.processed += 1;
            }
            match input {
                PeerInput::StartShare => self.start_share().await,
                PeerInput::Stop { reason, ack } => {
                    self.close(reason).await;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                }
                PeerInput::Signal(signal) => self.on_signal(signal).await,
                PeerInput::Transport { session_id, event } => {
                    self.on_transport(session_id, event).await
                }
                PeerInput::RestartTimeout { session_id, seq } => {
                    self.on_restart_timeout(session_id, seq).await
                }
                PeerInput::Snapshot(reply) => {
                    let _ = reply.send(self.current_snapshot());
                }
                PeerInput::Retire => break,
                PeerInput::Shutdown(ack) => {
                    self.close(CloseReason::Shutdown).await;
                    let _ = ack.send(());
                    break;
                }
            }
            self.offer_retirement();
        }
        debug!(peer = %self.ctx.peer_user_id, worker = self.worker_id, "Peer worker stopped");
    }

    fn current_snapshot(&self) -> Option<SessionSnapshot> {
        self.session
            .as_ref()
            .map(PeerSession::snapshot)
            .or_else(|| self.previous.clone())
    }

    /// With no live session there is nothing left to drive; ask the router
    /// to let this worker go.
    fn offer_retirement(&mut self) {
        if self.live_role().is_some() || self.announced == Some(self.processed) {
            return;
        }
        self.announced = Some(self.processed);
        let _ = self.retire_tx.send(Retirement {
            peer_user_id: self.ctx.peer_user_id.clone(),
            worker_id: self.worker_id,
            processed: self.processed,
            snapshot: self.current_snapshot(),
        });
    }

    fn live_role(&self) -> Option<(Role, SessionState)> {
        self.session
            .as_ref()
            .filter(|s| s.is_live())
            .map(|s| (s.role(), s.state()))
    }

    // -----------------------------------------------------------------------
    // Local operations
    // -----------------------------------------------------------------------

    async fn start_share(&mut self) {
        // Never two live sessions to one peer.
        self.close(CloseReason::LocalStop).await;

        let mut session = PeerSession::new(self.ctx.peer_user_id.as_str(), Role::Caller);
        info!(peer = %self.ctx.peer_user_id, session = %session.id(), "Starting screen share");
        self.ctx.transition(&mut session, SessionState::Negotiating);

        let result = self.ctx.negotiate_as_caller(&mut session).await;
        self.session = Some(session);
        if let Err(e) = result {
            self.fail(e).await;
        }
    }

    /// Close the live session, if any. Notifies the peer only for locally
    /// initiated closes.
    async fn close(&mut self, reason: CloseReason) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            return;
        };
        session.release().await;
        self.ctx.transition(session, SessionState::Closed);
        info!(
            peer = %self.ctx.peer_user_id,
            session = %session.id(),
            reason = ?reason,
            "Session closed"
        );

        if reason.notifies_peer() {
            if let Err(e) = self.ctx.send(Signal::ShareStopped).await {
                warn!(peer = %self.ctx.peer_user_id, error = %e, "Failed to send share-stopped");
            }
        }
    }

    async fn fail(&mut self, error: ShareError) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            return;
        };
        warn!(
            peer = %self.ctx.peer_user_id,
            session = %session.id(),
            error = %error,
            "Session failed"
        );
        session.release().await;
        self.ctx.transition(session, SessionState::Failed);
        self.ctx
            .emit(ScreenShareEvent::SessionFailed {
                peer_user_id: self.ctx.peer_user_id.clone(),
                session_id: session.id().clone(),
                error,
            });
    }

    // -----------------------------------------------------------------------
    // Inbound signals
    // -----------------------------------------------------------------------

    async fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Offer(offer) => self.on_offer(offer).await,
            Signal::Answer(answer) => self.on_answer(answer).await,
            Signal::IceCandidate(candidate) => self.on_remote_candidate(candidate).await,
            Signal::ShareStopped => {
                if self.live_role().is_some() {
                    self.close(CloseReason::RemoteStopped).await;
                } else {
                    debug!(peer = %self.ctx.peer_user_id, "share-stopped without a live session");
                }
            }
        }
    }

    async fn on_offer(&mut self, offer: OfferPayload) {
        match self.live_role() {
            Some((Role::Callee, _)) if offer.restart => {
                self.renegotiate(offer.description).await;
                return;
            }
            Some((Role::Caller, SessionState::Negotiating)) if !offer.restart => {
                // Glare: the smaller user id keeps the caller role.
                if self.ctx.local_user_id() < self.ctx.peer_user_id.as_str() {
                    info!(peer = %self.ctx.peer_user_id, "Glare: keeping caller role, ignoring offer");
                    return;
                }
                info!(peer = %self.ctx.peer_user_id, "Glare: yielding caller role");
                self.close(CloseReason::Replaced).await;
            }
            Some(_) => self.close(CloseReason::Replaced).await,
            None => {}
        }

        let mut session = PeerSession::new(self.ctx.peer_user_id.as_str(), Role::Callee);
        info!(peer = %self.ctx.peer_user_id, session = %session.id(), "Answering screen share");
        self.ctx.transition(&mut session, SessionState::Negotiating);

        let result = self
            .ctx
            .negotiate_as_callee(&mut session, offer.description)
            .await;
        self.session = Some(session);
        if let Err(e) = result {
            self.fail(e).await;
        }
    }

    /// Answer the caller's restart in place. The state is left alone: a
    /// Connected callee has seen no failure of its own, and a Reconnecting
    /// one already has a restart timer running.
    async fn renegotiate(&mut self, offer: SessionDescription) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        info!(
            peer = %self.ctx.peer_user_id,
            session = %session.id(),
            state = ?session.state(),
            "Restart offer received"
        );
        let result = self.ctx.renegotiate(session, offer).await;
        if let Err(e) = result {
            self.fail(e).await;
        }
    }

    async fn on_answer(&mut self, answer: SessionDescription) {
        let expected = matches!(
            self.live_role(),
            Some((Role::Caller, SessionState::Negotiating | SessionState::Reconnecting))
        );
        let Some(session) = self.session.as_mut().filter(|_| expected) else {
            warn!(peer = %self.ctx.peer_user_id, "Unexpected answer, dropping");
            return;
        };
        let result = session.apply_remote_description(answer).await;
        if let Err(e) = result {
            self.fail(e).await;
        }
    }

    async fn on_remote_candidate(&mut self, candidate: IceCandidate) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            warn!(peer = %self.ctx.peer_user_id, "Candidate without a live session, dropping");
            return;
        };
        let result = session.accept_remote_candidate(candidate).await;
        if let Err(e) = result {
            self.fail(e).await;
        }
    }

    // -----------------------------------------------------------------------
    // Transport reports
    // -----------------------------------------------------------------------

    async fn on_transport(&mut self, session_id: SessionId, event: TransportEvent) {
        let Some(session) = live_session(&mut self.session, &session_id) else {
            debug!(peer = %self.ctx.peer_user_id, session = %session_id, "Stale transport event discarded");
            return;
        };

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                if let Some(candidate) = session.accept_local_candidate(candidate) {
                    self.ctx.send_candidate(candidate).await;
                }
            }
            TransportEvent::RemoteTrack(media) => {
                session.set_remote_media(media.clone());
                info!(peer = %self.ctx.peer_user_id, kind = ?media.kind, "Remote media available");
                self.ctx
                    .emit(ScreenShareEvent::RemoteMediaAvailable {
                        peer_user_id: self.ctx.peer_user_id.clone(),
                        session_id,
                        media,
                    });
            }
            TransportEvent::Connectivity(state) => self.on_connectivity(state).await,
        }
    }

    async fn on_connectivity(&mut self, connectivity: ConnectivityState) {
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            return;
        };
        let state = session.state();

        match connectivity {
            ConnectivityState::Connected => {
                if matches!(state, SessionState::Negotiating | SessionState::Reconnecting) {
                    session.restart_attempts = 0;
                    self.ctx.transition(session, SessionState::Connected);
                    info!(peer = %self.ctx.peer_user_id, session = %session.id(), "Peer connected");
                }
            }
            ConnectivityState::Failed => match state {
                SessionState::Connected => {
                    warn!(peer = %self.ctx.peer_user_id, "Connectivity lost, restarting ICE");
                    self.ctx.transition(session, SessionState::Reconnecting);
                    self.attempt_restart().await;
                }
                SessionState::Reconnecting => self.attempt_restart().await,
                _ => self.fail(ShareError::ConnectivityLost).await,
            },
            ConnectivityState::Closed => self.fail(ShareError::ConnectivityLost).await,
            other => {
                debug!(peer = %self.ctx.peer_user_id, connectivity = ?other, "Connectivity update");
            }
        }
    }

    async fn on_restart_timeout(&mut self, session_id: SessionId, seq: u64) {
        let Some(session) = live_session(&mut self.session, &session_id) else {
            return;
        };
        if session.state() != SessionState::Reconnecting || session.restart_seq != seq {
            return;
        }
        warn!(peer = %self.ctx.peer_user_id, attempt = session.restart_attempts, "Restart attempt timed out");
        self.attempt_restart().await;
    }

    /// Consume one restart attempt, or fail the session once they are gone.
    async fn attempt_restart(&mut self) {
        let max = self.ctx.shared.config.max_restart_attempts;
        let Some(session) = self.session.as_mut().filter(|s| s.is_live()) else {
            return;
        };
        if session.restart_attempts >= max {
            let attempts = session.restart_attempts;
            self.fail(ShareError::RestartExhausted { attempts }).await;
            return;
        }

        session.restart_attempts += 1;
        session.restart_seq += 1;
        info!(
            peer = %self.ctx.peer_user_id,
            attempt = session.restart_attempts,
            max,
            role = ?session.role(),
            "ICE restart attempt"
        );

        // The callee waits for the caller's restart offer.
        if session.role() == Role::Caller {
            let result = self.ctx.send_restart_offer(session).await;
            if let Err(e) = result {
                self.fail(e).await;
                return;
            }
        }
        self.ctx
            .schedule_restart_timeout(session.id().clone(), session.restart_seq);
    }
}

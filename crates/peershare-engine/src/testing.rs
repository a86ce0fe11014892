//! In-memory fakes of the transport, capture, and signaling seams.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use peershare_common::{CaptureError, SessionId, SignalingError, TransportError};
use tokio::sync::mpsc;

use crate::capture::{CaptureRequest, LocalMedia, LocalTrack, MediaCapture, TrackKind};
use crate::engine::{EngineConfig, ScreenShareEngine, ScreenShareEvent};
use crate::protocol::{IceCandidate, OfferPayload, SdpType, SessionDescription, Signal, SignalingMessage};
use crate::session::SessionSnapshot;
use crate::signaling::SignalingChannel;
use crate::transport::{
    ConnectivityState, Transport, TransportCapability, TransportEvent, TransportEventSink,
    TransportFactory,
};

// ---------------------------------------------------------------------------
// Capture
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub(crate) struct FakeTrack {
    id: String,
    kind: TrackKind,
    live: AtomicBool,
}

impl FakeTrack {
    pub(crate) fn new(id: &str, kind: TrackKind) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            kind,
            live: AtomicBool::new(true),
        })
    }
}

impl LocalTrack for FakeTrack {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> TrackKind {
        self.kind
    }

    fn stop(&self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }
}

/// Screen video plus audio.
pub(crate) fn screen_media() -> (LocalMedia, Vec<Arc<FakeTrack>>) {
    let tracks = vec![
        FakeTrack::new("screen", TrackKind::Video),
        FakeTrack::new("mic", TrackKind::Audio),
    ];
    let media = LocalMedia::new(
        tracks
            .iter()
            .map(|t| Arc::clone(t) as Arc<dyn LocalTrack>)
            .collect(),
    );
    (media, tracks)
}

#[derive(Default)]
pub(crate) struct FakeCapture {
    deny: bool,
    tracks: Mutex<Vec<Arc<FakeTrack>>>,
    requests: Mutex<Vec<CaptureRequest>>,
}

impl FakeCapture {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn denying() -> Arc<Self> {
        Arc::new(Self {
            deny: true,
            ..Self::default()
        })
    }

    /// Tracks handed out so far that are still live.
    pub(crate) fn live_tracks(&self) -> usize {
        self.tracks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.is_live())
            .count()
    }

    pub(crate) fn captured(&self) -> usize {
        self.tracks.lock().unwrap().len()
    }

    pub(crate) fn requests(&self) -> Vec<CaptureRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaCapture for FakeCapture {
    async fn capture(&self, request: CaptureRequest) -> Result<LocalMedia, CaptureError> {
        self.requests.lock().unwrap().push(request);
        if self.deny {
            return Err(CaptureError::Denied);
        }
        let (media, tracks) = screen_media();
        self.tracks.lock().unwrap().extend(tracks);
        Ok(media)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RecorderState {
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    applied_candidates: Vec<IceCandidate>,
    candidate_errors: usize,
    senders: usize,
    senders_removed: bool,
    closed: bool,
    offers: usize,
    restart_offers: usize,
}

/// Read-only view of one fake transport.
#[derive(Clone, Default)]
pub(crate) struct TransportRecorder(Arc<Mutex<RecorderState>>);

impl TransportRecorder {
    pub(crate) fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.0.lock().unwrap().applied_candidates.clone()
    }

    pub(crate) fn candidate_errors(&self) -> usize {
        self.0.lock().unwrap().candidate_errors
    }

    pub(crate) fn local_description(&self) -> Option<SessionDescription> {
        self.0.lock().unwrap().local.clone()
    }

    pub(crate) fn senders(&self) -> usize {
        self.0.lock().unwrap().senders
    }

    pub(crate) fn senders_removed(&self) -> bool {
        self.0.lock().unwrap().senders_removed
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.0.lock().unwrap().closed
    }

    pub(crate) fn restart_offers(&self) -> usize {
        self.0.lock().unwrap().restart_offers
    }
}

/// Fake peer connection. Reports `Connected` as soon as both descriptions
/// are in place, mimicking ICE succeeding without any candidates.
pub(crate) struct FakeTransport {
    recorder: TransportRecorder,
    sink: Option<TransportEventSink>,
    gather_candidates: bool,
    fail_set_remote: bool,
    /// Never report connectivity on its own.
    silent: bool,
}

impl FakeTransport {
    /// A transport with no event sink, for session-level tests.
    pub(crate) fn detached() -> (Self, TransportRecorder) {
        let recorder = TransportRecorder::default();
        let transport = Self {
            recorder: recorder.clone(),
            sink: None,
            gather_candidates: false,
            fail_set_remote: false,
            silent: false,
        };
        (transport, recorder)
    }

    fn emit(&self, event: TransportEvent) {
        if let Some(sink) = &self.sink {
            sink.emit(event);
        }
    }

    fn maybe_connect(&self) {
        let ready = {
            let state = self.recorder.0.lock().unwrap();
            state.local.is_some() && state.remote.is_some()
        };
        if ready && !self.silent {
            self.emit(TransportEvent::Connectivity(ConnectivityState::Connected));
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn add_local_media(&mut self, media: &LocalMedia) -> Result<(), TransportError> {
        let mut state = self.recorder.0.lock().unwrap();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state.senders += media.tracks().len();
        Ok(())
    }

    async fn create_offer(
        &mut self,
        ice_restart: bool,
    ) -> Result<SessionDescription, TransportError> {
        let mut state = self.recorder.0.lock().unwrap();
        state.offers += 1;
        if ice_restart {
            state.restart_offers += 1;
        }
        Ok(SessionDescription::offer(format!(
            "v=0 offer {} restart={ice_restart}",
            state.offers
        )))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        let state = self.recorder.0.lock().unwrap();
        match &state.remote {
            Some(remote) if remote.sdp_type == SdpType::Offer => {
                Ok(SessionDescription::answer(format!("v=0 answer to {}", remote.sdp)))
            }
            _ => Err(TransportError::Description("no remote offer".into())),
        }
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.recorder.0.lock().unwrap();
            // A new offer starts a new exchange.
            if description.sdp_type == SdpType::Offer {
                state.remote = None;
            }
            state.local = Some(description);
        }
        if self.gather_candidates {
            self.emit(TransportEvent::LocalCandidate(IceCandidate {
                candidate: "candidate:1 1 udp 2122260223 10.0.0.1 50000 typ host".into(),
                sdp_mid: Some("0".into()),
                sdp_m_line_index: Some(0),
            }));
        }
        self.maybe_connect();
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        if self.fail_set_remote {
            return Err(TransportError::Description("unparseable sdp".into()));
        }
        {
            let mut state = self.recorder.0.lock().unwrap();
            if description.sdp_type == SdpType::Offer {
                state.local = None;
            }
            state.remote = Some(description);
        }
        self.maybe_connect();
        Ok(())
    }

    async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), TransportError> {
        let mut state = self.recorder.0.lock().unwrap();
        if state.remote.is_none() {
            state.candidate_errors += 1;
            return Err(TransportError::Candidate("no remote description".into()));
        }
        state.applied_candidates.push(candidate);
        Ok(())
    }

    async fn remove_senders(&mut self) -> Result<(), TransportError> {
        let mut state = self.recorder.0.lock().unwrap();
        state.senders = 0;
        state.senders_removed = true;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink = None;
        self.recorder.0.lock().unwrap().closed = true;
        Ok(())
    }
}

struct Created {
    session_id: SessionId,
    recorder: TransportRecorder,
    sink: TransportEventSink,
}

#[derive(Default)]
pub(crate) struct FakeTransportFactory {
    created: Mutex<Vec<Created>>,
    gather_candidates: bool,
    fail_set_remote: bool,
    silent: bool,
}

impl FakeTransportFactory {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every transport emits one host candidate when its local description
    /// is set.
    pub(crate) fn gathering() -> Arc<Self> {
        Arc::new(Self {
            gather_candidates: true,
            ..Self::default()
        })
    }

    /// Every transport rejects remote descriptions.
    pub(crate) fn rejecting_remote() -> Arc<Self> {
        Arc::new(Self {
            fail_set_remote: true,
            ..Self::default()
        })
    }

    /// Transports only report what the test injects with [`Self::emit`].
    pub(crate) fn silent() -> Arc<Self> {
        Arc::new(Self {
            silent: true,
            ..Self::default()
        })
    }

    pub(crate) fn capability(self: &Arc<Self>) -> TransportCapability {
        TransportCapability::Available(Arc::clone(self) as Arc<dyn TransportFactory>)
    }

    pub(crate) fn created(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub(crate) fn recorder(&self, index: usize) -> TransportRecorder {
        self.created.lock().unwrap()[index].recorder.clone()
    }

    pub(crate) fn session_id(&self, index: usize) -> SessionId {
        self.created.lock().unwrap()[index].session_id.clone()
    }

    /// Inject an event as if transport `index` had reported it. Returns
    /// false once the worker that owned the transport has exited.
    pub(crate) fn emit(&self, index: usize, event: TransportEvent) -> bool {
        let sink = self.created.lock().unwrap()[index].sink.clone();
        sink.emit(event)
    }
}

#[async_trait]
impl TransportFactory for FakeTransportFactory {
    async fn create(
        &self,
        session_id: &SessionId,
        sink: TransportEventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let recorder = TransportRecorder::default();
        self.created.lock().unwrap().push(Created {
            session_id: session_id.clone(),
            recorder: recorder.clone(),
            sink: sink.clone(),
        });
        Ok(Box::new(FakeTransport {
            recorder,
            sink: Some(sink),
            gather_candidates: self.gather_candidates,
            fail_set_remote: self.fail_set_remote,
            silent: self.silent,
        }))
    }
}

// ---------------------------------------------------------------------------
// Signaling
// ---------------------------------------------------------------------------

/// Records every outbound message and optionally delivers it to another
/// engine.
#[derive(Default)]
pub(crate) struct RecordingSignaling {
    sent: Mutex<Vec<SignalingMessage>>,
    forward: Mutex<Option<ScreenShareEngine>>,
    delivered: AtomicUsize,
}

impl RecordingSignaling {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn connect_to(&self, engine: &ScreenShareEngine) {
        *self.forward.lock().unwrap() = Some(engine.clone_sender());
    }

    pub(crate) fn sent(&self) -> Vec<SignalingMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn kinds(&self) -> Vec<&'static str> {
        self.sent().iter().map(|m| m.signal.kind()).collect()
    }

    pub(crate) fn count(&self, kind: &str) -> usize {
        self.kinds().iter().filter(|k| **k == kind).count()
    }

    pub(crate) fn offers(&self) -> Vec<OfferPayload> {
        self.sent()
            .into_iter()
            .filter_map(|m| match m.signal {
                Signal::Offer(offer) => Some(offer),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn restart_offers(&self) -> usize {
        self.offers().iter().filter(|o| o.restart).count()
    }

    pub(crate) fn last_answer(&self) -> Option<SessionDescription> {
        self.sent().into_iter().rev().find_map(|m| match m.signal {
            Signal::Answer(answer) => Some(answer),
            _ => None,
        })
    }
}

#[async_trait]
impl SignalingChannel for RecordingSignaling {
    async fn send(&self, message: SignalingMessage) -> Result<(), SignalingError> {
        self.sent.lock().unwrap().push(message.clone());
        let target = self
            .forward
            .lock()
            .unwrap()
            .as_ref()
            .map(ScreenShareEngine::clone_sender);
        if let Some(engine) = target {
            engine
                .handle_message(message)
                .await
                .map_err(|_| SignalingError::Disconnected)?;
            self.delivered.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Peer {
    pub(crate) engine: ScreenShareEngine,
    pub(crate) events: mpsc::Receiver<ScreenShareEvent>,
    pub(crate) factory: Arc<FakeTransportFactory>,
    pub(crate) capture: Arc<FakeCapture>,
    pub(crate) signaling: Arc<RecordingSignaling>,
}

impl Peer {
    pub(crate) fn new(user_id: &str) -> Self {
        Self::with(user_id, FakeTransportFactory::new(), FakeCapture::new(), EngineConfig::default())
    }

    pub(crate) fn with(
        user_id: &str,
        factory: Arc<FakeTransportFactory>,
        capture: Arc<FakeCapture>,
        config: EngineConfig,
    ) -> Self {
        let signaling = RecordingSignaling::new();
        let (engine, events) = ScreenShareEngine::new(
            user_id,
            factory.capability(),
            Arc::clone(&capture) as Arc<dyn MediaCapture>,
            Arc::clone(&signaling) as Arc<dyn SignalingChannel>,
            config,
        )
        .expect("capability is available");
        Self {
            engine,
            events,
            factory,
            capture,
            signaling,
        }
    }

    pub(crate) async fn snapshot(&self, peer: &str) -> Option<SessionSnapshot> {
        self.engine.snapshot(peer).await.unwrap()
    }

    /// Poll until the session with `peer` satisfies `pred`.
    pub(crate) async fn wait_for(
        &self,
        peer: &str,
        pred: impl Fn(&SessionSnapshot) -> bool,
    ) -> SessionSnapshot {
        for _ in 0..400 {
            if let Some(snapshot) = self.snapshot(peer).await {
                if pred(&snapshot) {
                    return snapshot;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!(
            "condition not reached, last snapshot: {:?}",
            self.snapshot(peer).await
        );
    }

    /// Let queued inputs, and the inputs they enqueue, drain.
    pub(crate) async fn settle(&self, peer: &str) {
        for _ in 0..3 {
            let _ = self.snapshot(peer).await;
            tokio::task::yield_now().await;
        }
    }

    /// Deliver a message from `from` as if it came over signaling.
    pub(crate) async fn receive(&self, from: &str, signal: Signal) {
        let message = SignalingMessage::new(from, self.engine.local_user_id(), signal);
        self.engine.handle_message(message).await.unwrap();
    }

    /// Drain events received so far.
    pub(crate) fn drain_events(&mut self) -> Vec<ScreenShareEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

pub(crate) fn offer(sdp: &str, restart: bool) -> Signal {
    Signal::Offer(OfferPayload {
        description: SessionDescription::offer(sdp),
        restart,
    })
}

pub(crate) fn answer(sdp: &str) -> Signal {
    Signal::Answer(SessionDescription::answer(sdp))
}

pub(crate) fn candidate(n: u32) -> IceCandidate {
    IceCandidate {
        candidate: format!("candidate:{n} 1 udp 2122260223 10.0.0.{n} 5000{n} typ host"),
        sdp_mid: Some("0".into()),
        sdp_m_line_index: Some(0),
    }
}

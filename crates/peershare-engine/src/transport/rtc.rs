//! Transport Capability backed by the `webrtc` crate.

use std::sync::Arc;

use async_trait::async_trait;
use peershare_common::{SessionId, TransportError};
use peershare_config::IceConfig;
use tracing::{debug, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use super::{ConnectivityState, Transport, TransportEvent, TransportEventSink, TransportFactory};
use crate::capture::{LocalMedia, RemoteMedia, TrackKind};
use crate::protocol::{IceCandidate, SdpType, SessionDescription};

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds one `RTCPeerConnection` per peer session using the configured
/// STUN/TURN servers.
pub struct RtcTransportFactory {
    ice_servers: Vec<RTCIceServer>,
}

impl RtcTransportFactory {
    pub fn new(ice: &IceConfig) -> Self {
        let ice_servers = ice
            .servers
            .iter()
            .map(|server| RTCIceServer {
                urls: server.urls.clone(),
                username: server.username.clone().unwrap_or_default(),
                credential: server.credential.clone().unwrap_or_default(),
                ..Default::default()
            })
            .collect();
        Self { ice_servers }
    }
}

#[async_trait]
impl TransportFactory for RtcTransportFactory {
    async fn create(
        &self,
        session_id: &SessionId,
        sink: TransportEventSink,
    ) -> Result<Box<dyn Transport>, TransportError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| TransportError::Media(format!("failed to register codecs: {e}")))?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(|e| TransportError::Media(format!("failed to register interceptors: {e}")))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let config = RTCConfiguration {
            ice_servers: self.ice_servers.clone(),
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(config)
                .await
                .map_err(|e| TransportError::Media(format!("failed to create peer connection: {e}")))?,
        );

        wire_callbacks(&pc, sink);
        info!(session = %session_id, "Peer connection created");

        Ok(Box::new(RtcTransport {
            pc,
            stream_id: format!("stream-{session_id}"),
            senders: Vec::new(),
        }))
    }
}

fn wire_callbacks(pc: &RTCPeerConnection, sink: TransportEventSink) {
    let candidate_sink = sink.clone();
    pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
        let sink = candidate_sink.clone();
        Box::pin(async move {
            // `None` marks the end of gathering.
            let Some(candidate) = candidate else { return };
            match candidate.to_json() {
                Ok(init) => {
                    sink.emit(TransportEvent::LocalCandidate(IceCandidate {
                        candidate: init.candidate,
                        sdp_mid: init.sdp_mid,
                        sdp_m_line_index: init.sdp_mline_index,
                    }));
                }
                Err(e) => warn!(error = %e, "Failed to serialize local candidate"),
            }
        })
    }));

    let state_sink = sink.clone();
    pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
        let sink = state_sink.clone();
        Box::pin(async move {
            let mapped = match state {
                RTCPeerConnectionState::New => ConnectivityState::New,
                RTCPeerConnectionState::Connecting => ConnectivityState::Checking,
                RTCPeerConnectionState::Connected => ConnectivityState::Connected,
                RTCPeerConnectionState::Disconnected => ConnectivityState::Disconnected,
                RTCPeerConnectionState::Failed => ConnectivityState::Failed,
                RTCPeerConnectionState::Closed => ConnectivityState::Closed,
                _ => return,
            };
            debug!(session = %sink.session_id(), state = ?mapped, "Connectivity changed");
            sink.emit(TransportEvent::Connectivity(mapped));
        })
    }));

    pc.on_track(Box::new(
        move |track: Arc<TrackRemote>,
              _receiver: Arc<RTCRtpReceiver>,
              _transceiver: Arc<RTCRtpTransceiver>| {
            let sink = sink.clone();
            Box::pin(async move {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    _ => TrackKind::Video,
                };
                sink.emit(TransportEvent::RemoteTrack(RemoteMedia {
                    stream_id: track.stream_id(),
                    track_id: track.id(),
                    kind,
                }));
            })
        },
    ));
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

struct RtcTransport {
    pc: Arc<RTCPeerConnection>,
    stream_id: String,
    senders: Vec<Arc<RTCRtpSender>>,
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    match kind {
        TrackKind::Video => RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            channels: 0,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
        TrackKind::Audio => RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            sdp_fmtp_line: String::new(),
            rtcp_feedback: vec![],
        },
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, TransportError> {
    let parsed = match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    };
    parsed.map_err(|e| TransportError::Description(format!("invalid sdp: {e}")))
}

#[async_trait]
impl Transport for RtcTransport {
    async fn add_local_media(&mut self, media: &LocalMedia) -> Result<(), TransportError> {
        for track in media.tracks() {
            let local = Arc::new(TrackLocalStaticSample::new(
                codec_for(track.kind()),
                track.id().to_string(),
                self.stream_id.clone(),
            ));
            let sender = self
                .pc
                .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .map_err(|e| TransportError::Media(format!("failed to add track: {e}")))?;
            self.senders.push(sender);
        }
        Ok(())
    }

    async fn create_offer(
        &mut self,
        ice_restart: bool,
    ) -> Result<SessionDescription, TransportError> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });
        let offer = self
            .pc
            .create_offer(options)
            .await
            .map_err(|e| TransportError::Description(format!("failed to create offer: {e}")))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&mut self) -> Result<SessionDescription, TransportError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| TransportError::Description(format!("failed to create answer: {e}")))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_local_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(|e| TransportError::Description(format!("failed to set local description: {e}")))
    }

    async fn set_remote_description(
        &mut self,
        description: SessionDescription,
    ) -> Result<(), TransportError> {
        self.pc
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(|e| {
                TransportError::Description(format!("failed to set remote description: {e}"))
            })
    }

    async fn add_remote_candidate(
        &mut self,
        candidate: IceCandidate,
    ) -> Result<(), TransportError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(|e| TransportError::Candidate(format!("failed to add candidate: {e}")))
    }

    async fn remove_senders(&mut self) -> Result<(), TransportError> {
        for sender in self.senders.drain(..) {
            self.pc
                .remove_track(&sender)
                .await
                .map_err(|e| TransportError::Media(format!("failed to remove sender: {e}")))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.senders.clear();
        self.pc
            .close()
            .await
            .map_err(|_| TransportError::Closed)
    }
}

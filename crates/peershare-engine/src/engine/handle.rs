//! Public handle for the screen share engine.

use std::sync::Arc;

use peershare_common::ShareError;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::router::router_loop;
use super::types::{CloseReason, EngineCommand, EngineConfig, PeerInput, ScreenShareEvent};
use super::worker::EngineShared;
use crate::capture::MediaCapture;
use crate::protocol::{Signal, SignalingMessage};
use crate::session::SessionSnapshot;
use crate::signaling::{SignalAdapter, SignalingChannel};
use crate::transport::TransportCapability;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Handle to one screen share engine, the sole owner of every peer session.
///
/// Cheap handles can be made with [`clone_sender`](Self::clone_sender); all
/// of them talk to the same background router. A disabled engine (built when
/// the transport capability is missing) accepts every call and does nothing.
pub struct ScreenShareEngine {
    command_tx: Option<mpsc::Sender<EngineCommand>>,
    adapter: SignalAdapter,
}

impl ScreenShareEngine {
    /// Build the engine and start its router.
    /// Returns `(engine, event_receiver)`.
    ///
    /// Fails with [`ShareError::CapabilityUnavailable`] when the runtime has
    /// no peer-to-peer transport.
    pub fn new(
        local_user_id: impl Into<String>,
        capability: TransportCapability,
        capture: Arc<dyn MediaCapture>,
        signaling: Arc<dyn SignalingChannel>,
        config: EngineConfig,
    ) -> Result<(Self, mpsc::Receiver<ScreenShareEvent>), ShareError> {
        let factory = match capability {
            TransportCapability::Available(factory) => factory,
            TransportCapability::Unavailable(reason) => {
                return Err(ShareError::CapabilityUnavailable(reason));
            }
        };

        let adapter = SignalAdapter::new(local_user_id);
        let (event_tx, event_rx) = mpsc::channel(config.event_capacity.max(1));
        let (command_tx, command_rx) = mpsc::channel(64);

        let shared = Arc::new(EngineShared {
            factory,
            capture,
            signaling,
            adapter: adapter.clone(),
            config,
            event_tx,
        });
        tokio::spawn(router_loop(shared, command_rx));
        info!(user_id = %adapter.local_user_id(), "Screen share engine started");

        Ok((
            Self {
                command_tx: Some(command_tx),
                adapter,
            },
            event_rx,
        ))
    }

    /// Like [`new`](Self::new), but degrades to a disabled engine instead of
    /// failing, so the rest of the application keeps working.
    pub fn new_or_disabled(
        local_user_id: impl Into<String>,
        capability: TransportCapability,
        capture: Arc<dyn MediaCapture>,
        signaling: Arc<dyn SignalingChannel>,
        config: EngineConfig,
    ) -> (Self, mpsc::Receiver<ScreenShareEvent>) {
        let local_user_id = local_user_id.into();
        match Self::new(local_user_id.clone(), capability, capture, signaling, config) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(error = %e, "Screen share disabled");
                let (_, event_rx) = mpsc::channel(1);
                (
                    Self {
                        command_tx: None,
                        adapter: SignalAdapter::new(local_user_id),
                    },
                    event_rx,
                )
            }
        }
    }

    /// Lightweight handle to the same engine.
    pub fn clone_sender(&self) -> Self {
        Self {
            command_tx: self.command_tx.clone(),
            adapter: self.adapter.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.command_tx.is_some()
    }

    pub fn local_user_id(&self) -> &str {
        self.adapter.local_user_id()
    }

    async fn dispatch(&self, command: EngineCommand) -> Result<(), ShareError> {
        let Some(tx) = &self.command_tx else {
            return Ok(());
        };
        tx.send(command).await.map_err(|_| ShareError::EngineStopped)
    }

    async fn to_peer(&self, peer_user_id: &str, input: PeerInput) -> Result<(), ShareError> {
        self.dispatch(EngineCommand::Peer {
            peer_user_id: peer_user_id.to_string(),
            input,
        })
        .await
    }

    // -----------------------------------------------------------------------
    // UI operations
    // -----------------------------------------------------------------------

    /// Share the local screen with `peer_user_id`. Any live session with that
    /// peer is closed first.
    pub async fn start_share(&self, peer_user_id: &str) -> Result<(), ShareError> {
        if peer_user_id.is_empty() || peer_user_id == self.local_user_id() {
            return Err(ShareError::NegotiationFailed(format!(
                "invalid share target {peer_user_id:?}"
            )));
        }
        self.to_peer(peer_user_id, PeerInput::StartShare).await
    }

    /// Close the session with `peer_user_id` and tell the peer.
    pub async fn stop_share(&self, peer_user_id: &str) -> Result<(), ShareError> {
        self.to_peer(
            peer_user_id,
            PeerInput::Stop {
                reason: CloseReason::LocalStop,
                ack: None,
            },
        )
        .await
    }

    /// The local capture source ended on its own (e.g. the user stopped
    /// sharing from the system picker).
    pub async fn local_media_ended(&self, peer_user_id: &str) -> Result<(), ShareError> {
        self.to_peer(
            peer_user_id,
            PeerInput::Stop {
                reason: CloseReason::MediaEnded,
                ack: None,
            },
        )
        .await
    }

    /// Close every session, notifying each peer. Resolves once all of them
    /// are closed.
    pub async fn cleanup(&self) -> Result<(), ShareError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(EngineCommand::Cleanup(tx)).await?;
        if self.is_enabled() {
            rx.await.map_err(|_| ShareError::EngineStopped)?;
        }
        Ok(())
    }

    /// Current state of the session with `peer_user_id`, including sessions
    /// that already closed or failed.
    pub async fn snapshot(&self, peer_user_id: &str) -> Result<Option<SessionSnapshot>, ShareError> {
        if !self.is_enabled() {
            return Ok(None);
        }
        let (tx, rx) = oneshot::channel();
        self.dispatch(EngineCommand::Snapshot {
            peer_user_id: peer_user_id.to_string(),
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| ShareError::EngineStopped)
    }

    /// Close every session and stop the engine. Later calls fail with
    /// [`ShareError::EngineStopped`].
    pub async fn shutdown(&self) -> Result<(), ShareError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(EngineCommand::Shutdown(tx)).await?;
        if self.is_enabled() {
            rx.await.map_err(|_| ShareError::EngineStopped)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Inbound signaling
    // -----------------------------------------------------------------------

    /// Feed one raw inbound envelope. Malformed or misaddressed messages are
    /// logged and dropped.
    pub async fn handle_signal(&self, value: &Value) -> Result<(), ShareError> {
        match self.adapter.decode(value) {
            Ok(inbound) => self.route(inbound.peer_user_id, inbound.signal).await,
            Err(e) => {
                warn!(error = %e, "Dropping inbound signaling message");
                Ok(())
            }
        }
    }

    /// Feed one already-decoded inbound message.
    pub async fn handle_message(&self, message: SignalingMessage) -> Result<(), ShareError> {
        match self.adapter.accept(message) {
            Ok(inbound) => self.route(inbound.peer_user_id, inbound.signal).await,
            Err(e) => {
                warn!(error = %e, "Dropping inbound signaling message");
                Ok(())
            }
        }
    }

    async fn route(
        &self,
        peer_user_id: String,
        signal: Signal,
    ) -> Result<(), ShareError> {
        debug!(peer = %peer_user_id, kind = signal.kind(), "Inbound signal");
        self.dispatch(EngineCommand::Peer {
            peer_user_id,
            input: PeerInput::Signal(signal),
        })
        .await
    }

    /// Pump inbound envelopes (e.g. from [`RelaySignaling`]) into the engine
    /// until the stream ends or the engine stops.
    ///
    /// [`RelaySignaling`]: crate::signaling::RelaySignaling
    pub fn attach_inbound(&self, mut inbound_rx: mpsc::Receiver<Value>) -> JoinHandle<()> {
        let engine = self.clone_sender();
        tokio::spawn(async move {
            while let Some(value) = inbound_rx.recv().await {
                if engine.handle_signal(&value).await.is_err() {
                    debug!("Engine stopped, inbound pump exiting");
                    break;
                }
            }
        })
    }
}

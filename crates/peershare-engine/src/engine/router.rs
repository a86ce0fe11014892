//! Router task: owns the peer → worker map and fans commands out.
//!
//! Workers with no live session offer to retire. The router lets them go
//! once it has sent them nothing they have not handled, and keeps their
//! last snapshot so terminal sessions stay observable.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::types::{CloseReason, EngineCommand, PeerInput, Retirement};
use super::worker::{spawn_worker, EngineShared};
use crate::session::SessionSnapshot;

struct WorkerHandle {
    id: u64,
    tx: mpsc::UnboundedSender<PeerInput>,
    /// Inputs sent to this worker so far.
    sent: u64,
}

impl WorkerHandle {
    fn send(&mut self, input: PeerInput) -> bool {
        self.sent += 1;
        self.tx.send(input).is_ok()
    }
}

struct Router {
    shared: Arc<EngineShared>,
    peers: HashMap<String, WorkerHandle>,
    /// Last snapshot of peers whose worker has retired.
    retired: HashMap<String, SessionSnapshot>,
    retire_tx: mpsc::UnboundedSender<Retirement>,
    next_worker_id: u64,
}

pub(crate) async fn router_loop(
    shared: Arc<EngineShared>,
    mut command_rx: mpsc::Receiver<EngineCommand>,
) {
    let (retire_tx, mut retire_rx) = mpsc::unbounded_channel();
    let mut router = Router {
        shared,
        peers: HashMap::new(),
        retired: HashMap::new(),
        retire_tx,
        next_worker_id: 0,
    };

    loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                if let EngineCommand::Shutdown(ack) = command {
                    // Refuse new commands before acknowledging.
                    command_rx.close();
                    router.stop_workers().await;
                    let _ = ack.send(());
                    info!("Screen share engine stopped");
                    return;
                }
                router.handle(command);
            }
            Some(retirement) = retire_rx.recv() => router.retire(retirement),
        }
    }

    // Every handle dropped.
    router.stop_workers().await;
    debug!("Screen share engine router exited");
}

impl Router {
    fn handle(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Peer {
                peer_user_id,
                input,
            } => {
                if !self.worker(peer_user_id).send(input) {
                    warn!("Peer worker gone, input dropped");
                }
            }
            EngineCommand::Snapshot {
                peer_user_id,
                reply,
            } => match self.peers.get_mut(&peer_user_id) {
                Some(worker) => {
                    worker.send(PeerInput::Snapshot(reply));
                }
                None => {
                    let _ = reply.send(self.retired.get(&peer_user_id).cloned());
                }
            },
            EngineCommand::Cleanup(ack) => {
                let acks: Vec<_> = self
                    .peers
                    .values_mut()
                    .map(|worker| {
                        let (tx, rx) = oneshot::channel();
                        worker.send(PeerInput::Stop {
                            reason: CloseReason::Cleanup,
                            ack: Some(tx),
                        });
                        rx
                    })
                    .collect();
                // Workers keep running; only the caller waits.
                tokio::spawn(async move {
                    for rx in acks {
                        let _ = rx.await;
                    }
                    let _ = ack.send(());
                });
            }
            EngineCommand::Shutdown(ack) => {
                // Intercepted by `router_loop`.
                let _ = ack.send(());
            }
        }
    }

    /// The worker for `peer_user_id`, spawned on first use.
    fn worker(&mut self, peer_user_id: String) -> &mut WorkerHandle {
        let Self {
            shared,
            peers,
            retired,
            retire_tx,
            next_worker_id,
        } = self;
        peers.entry(peer_user_id).or_insert_with_key(|peer| {
            *next_worker_id += 1;
            let id = *next_worker_id;
            debug!(peer = %peer, worker = id, "Spawning peer worker");
            let previous = retired.remove(peer);
            WorkerHandle {
                id,
                tx: spawn_worker(shared, peer, id, previous, retire_tx.clone()),
                sent: 0,
            }
        })
    }

    fn retire(&mut self, retirement: Retirement) {
        let Retirement {
            peer_user_id,
            worker_id,
            processed,
            snapshot,
        } = retirement;

        // Stale offer, or inputs are still on their way to the worker.
        let accepted = self
            .peers
            .get(&peer_user_id)
            .is_some_and(|w| w.id == worker_id && w.sent == processed);
        if !accepted {
            return;
        }

        if let Some(worker) = self.peers.remove(&peer_user_id) {
            let _ = worker.tx.send(PeerInput::Retire);
        }
        if let Some(snapshot) = snapshot {
            self.retired.insert(peer_user_id.clone(), snapshot);
        }
        debug!(peer = %peer_user_id, worker = worker_id, "Peer worker retired");
    }

    async fn stop_workers(&mut self) {
        let acks: Vec<_> = self
            .peers
            .drain()
            .map(|(_, worker)| {
                let (tx, rx) = oneshot::channel();
                let _ = worker.tx.send(PeerInput::Shutdown(tx));
                rx
            })
            .collect();
        for rx in acks {
            let _ = rx.await;
        }
    }
}

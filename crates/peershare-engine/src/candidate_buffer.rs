//! Holds ICE candidates that arrive before their session can use them.
//!
//! Local candidates wait until the peer is known to have our description;
//! remote candidates wait until the peer's description has been applied.
//! Both queues flush in arrival order.

use std::mem;

use crate::protocol::IceCandidate;

#[derive(Debug, Default)]
pub struct CandidateBuffer {
    local: Vec<IceCandidate>,
    remote: Vec<IceCandidate>,
}

impl CandidateBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer_local(&mut self, candidate: IceCandidate) {
        self.local.push(candidate);
    }

    /// Drain pending local candidates, oldest first.
    pub fn flush_local(&mut self) -> Vec<IceCandidate> {
        mem::take(&mut self.local)
    }

    pub fn buffer_remote(&mut self, candidate: IceCandidate) {
        self.remote.push(candidate);
    }

    /// Drain pending remote candidates, oldest first.
    pub fn flush_remote(&mut self) -> Vec<IceCandidate> {
        mem::take(&mut self.remote)
    }

    pub fn pending_local(&self) -> usize {
        self.local.len()
    }

    pub fn pending_remote(&self) -> usize {
        self.remote.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.remote.is_empty()
    }

    pub fn clear(&mut self) {
        self.local.clear();
        self.remote.clear();
    }
}

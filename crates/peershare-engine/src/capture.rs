//! Local media acquisition seam and owned media handles.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use peershare_common::CaptureError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// One captured media track. `stop` must be idempotent.
pub trait LocalTrack: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;
    fn kind(&self) -> TrackKind;
    fn stop(&self);
    fn is_live(&self) -> bool;
}

/// What the engine asks the capture collaborator for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub video: bool,
    pub audio: bool,
}

impl CaptureRequest {
    /// Screen video is always requested; audio follows configuration.
    pub fn screen(audio: bool) -> Self {
        Self { video: true, audio }
    }
}

/// Local media exclusively owned by one peer session.
///
/// Dropping the handle stops every track, so media can never outlive the
/// session that holds it.
#[derive(Debug, Default)]
pub struct LocalMedia {
    tracks: Vec<Arc<dyn LocalTrack>>,
}

impl LocalMedia {
    pub fn new(tracks: Vec<Arc<dyn LocalTrack>>) -> Self {
        Self { tracks }
    }

    pub fn tracks(&self) -> &[Arc<dyn LocalTrack>] {
        &self.tracks
    }

    pub fn has_video(&self) -> bool {
        self.tracks.iter().any(|t| t.kind() == TrackKind::Video)
    }

    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    pub fn stop(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

impl Drop for LocalMedia {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Remote media announced by the transport. Referenced, never owned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMedia {
    pub stream_id: String,
    pub track_id: String,
    pub kind: TrackKind,
}

/// Media capture collaborator (screen picker, camera, test source).
#[async_trait]
pub trait MediaCapture: Send + Sync {
    async fn capture(&self, request: CaptureRequest) -> Result<LocalMedia, CaptureError>;
}

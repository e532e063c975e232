//! Media acquisition boundary.
//!
//! This module models the live-media side of the loop:
//! - `MediaDevices`: the capability request for a video-only stream (may be denied)
//! - `MediaStream`: the stream handle, a shared reference to its tracks
//! - `VideoTrack`: one live track exposing its current picture
//!
//! Device backends are selected by URL scheme:
//! - `stub://...` synthetic camera (tests, demos)
//! - `http(s)://...` MJPEG or single-JPEG HTTP camera
//!
//! Tracks only ever expose their most recent picture. Nothing here buffers
//! past frames or writes them anywhere.

pub mod mjpeg;
pub mod synthetic;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use thiserror::Error;
use url::Url;

use crate::frame::Frame;

pub use mjpeg::MjpegDevices;
pub use synthetic::SyntheticDevices;

/// Stream acquisition failures.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("media access denied: {0}")]
    Denied(String),

    #[error("media device unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported media source '{0}'; expected stub:// or http(s)://")]
    UnsupportedSource(String),

    #[error("invalid media constraints: {0}")]
    InvalidConstraints(String),
}

/// Lifecycle of a single track.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackState {
    Live,
    Ended,
}

/// A live video track.
///
/// Implementations use interior mutability: the same track is shared by every
/// clone of its `MediaStream`.
pub trait VideoTrack: Send + Sync {
    /// Human readable track label (device name or URL).
    fn label(&self) -> &str;

    fn ready_state(&self) -> TrackState;

    /// Snapshot of the picture the track is showing right now.
    fn current_frame(&self) -> Result<Frame>;

    /// Stop the track and release its device. Idempotent.
    fn stop(&self);
}

/// What the caller asks the device for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MediaConstraints {
    pub video: bool,
    pub audio: bool,
    pub width: u32,
    pub height: u32,
}

impl MediaConstraints {
    /// Video-only request at the given preferred size.
    pub fn video_only(width: u32, height: u32) -> Self {
        Self {
            video: true,
            audio: false,
            width,
            height,
        }
    }

    pub(crate) fn check(&self) -> Result<(), AcquisitionError> {
        if !self.video {
            return Err(AcquisitionError::InvalidConstraints(
                "a video track is required".to_string(),
            ));
        }
        if self.audio {
            return Err(AcquisitionError::InvalidConstraints(
                "audio capture is not supported".to_string(),
            ));
        }
        if self.width == 0 || self.height == 0 {
            return Err(AcquisitionError::InvalidConstraints(format!(
                "frame size {}x{} must be non-zero",
                self.width, self.height
            )));
        }
        Ok(())
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::video_only(640, 480)
    }
}

/// Handle to an acquired stream.
///
/// Cloning is cheap; clones refer to the same tracks, so stopping through any
/// clone stops the tracks for all of them.
#[derive(Clone)]
pub struct MediaStream {
    id: String,
    tracks: Arc<Vec<Arc<dyn VideoTrack>>>,
}

impl MediaStream {
    pub fn new(tracks: Vec<Arc<dyn VideoTrack>>) -> Self {
        Self {
            id: format!("stream-{:08x}", rand::random::<u32>()),
            tracks: Arc::new(tracks),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[Arc<dyn VideoTrack>] {
        &self.tracks
    }

    /// First track that is still live.
    pub fn live_track(&self) -> Option<&Arc<dyn VideoTrack>> {
        self.tracks
            .iter()
            .find(|track| track.ready_state() == TrackState::Live)
    }

    /// True while any track is live.
    pub fn is_active(&self) -> bool {
        self.live_track().is_some()
    }

    /// Stop every track of the stream.
    pub fn stop_all(&self) {
        for track in self.tracks.iter() {
            if track.ready_state() == TrackState::Live {
                log::debug!("stopping track {} of {}", track.label(), self.id);
            }
            track.stop();
        }
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("tracks", &self.tracks.len())
            .field("active", &self.is_active())
            .finish()
    }
}

/// Capability request for a live stream.
pub trait MediaDevices: Send {
    fn get_user_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, AcquisitionError>;
}

/// Pick a device backend for a source URL.
pub fn devices_for_url(
    source: &str,
    timeout: Option<Duration>,
) -> Result<Box<dyn MediaDevices>, AcquisitionError> {
    if source.starts_with("stub://") {
        return Ok(Box::new(SyntheticDevices::new(source)));
    }
    let url =
        Url::parse(source).map_err(|_| AcquisitionError::UnsupportedSource(source.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(Box::new(MjpegDevices::new(source, timeout))),
        _ => Err(AcquisitionError::UnsupportedSource(source.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraints_must_be_video_only() {
        let mut c = MediaConstraints::video_only(320, 240);
        assert!(c.check().is_ok());
        c.audio = true;
        assert!(matches!(
            c.check(),
            Err(AcquisitionError::InvalidConstraints(_))
        ));
        let c = MediaConstraints::video_only(0, 240);
        assert!(c.check().is_err());
    }

    #[test]
    fn selects_backend_by_scheme() {
        assert!(devices_for_url("stub://webcam", None).is_ok());
        assert!(devices_for_url("http://127.0.0.1:81/stream", None).is_ok());
        assert!(matches!(
            devices_for_url("rtsp://camera/stream", None),
            Err(AcquisitionError::UnsupportedSource(_))
        ));
        assert!(matches!(
            devices_for_url("/dev/video0", None),
            Err(AcquisitionError::UnsupportedSource(_))
        ));
    }

    #[test]
    fn stopping_any_clone_ends_shared_tracks() {
        let mut devices = SyntheticDevices::new("stub://webcam");
        let stream = devices
            .get_user_media(&MediaConstraints::video_only(32, 24))
            .unwrap();
        let attached = stream.clone();
        assert!(attached.is_active());
        stream.stop_all();
        assert!(!attached.is_active());
        assert!(attached
            .tracks()
            .iter()
            .all(|t| t.ready_state() == TrackState::Ended));
    }
}

//! Frame source: the stream attached to the display, sampled on demand.

use anyhow::{anyhow, Result};

use crate::frame::Frame;
use crate::media::MediaStream;

/// Samples the attached stream at the configured capture size.
///
/// Holds no frames of its own: every `capture` reads the track's current
/// picture, so callers always see the most recent content.
pub struct FrameSource {
    stream: Option<MediaStream>,
    width: u32,
    height: u32,
    frames_captured: u64,
}

impl FrameSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            stream: None,
            width,
            height,
            frames_captured: 0,
        }
    }

    /// Use `stream` as the input. Replaces any previous input.
    pub fn attach(&mut self, stream: MediaStream) {
        log::debug!("frame source attached to {}", stream.id());
        self.stream = Some(stream);
    }

    /// Remove the input, returning it.
    pub fn detach(&mut self) -> Option<MediaStream> {
        let stream = self.stream.take();
        if let Some(stream) = &stream {
            log::debug!("frame source detached from {}", stream.id());
        }
        stream
    }

    pub fn is_attached(&self) -> bool {
        self.stream.is_some()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Snapshot the current picture of the first live track.
    pub fn capture(&mut self) -> Result<Frame> {
        let stream = self
            .stream
            .as_ref()
            .ok_or_else(|| anyhow!("frame source has no stream attached"))?;
        let track = stream
            .live_track()
            .ok_or_else(|| anyhow!("stream {} has no live video track", stream.id()))?;
        let frame = track.current_frame()?.fit_to(self.width, self.height);
        self.frames_captured += 1;
        Ok(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaConstraints, MediaDevices, SyntheticDevices};

    fn stream(width: u32, height: u32) -> MediaStream {
        SyntheticDevices::new("stub://webcam")
            .get_user_media(&MediaConstraints::video_only(width, height))
            .unwrap()
    }

    #[test]
    fn capture_requires_attached_stream() {
        let mut source = FrameSource::new(64, 48);
        assert!(source.capture().is_err());
        assert_eq!(source.frames_captured(), 0);
    }

    #[test]
    fn capture_scales_to_canvas_size() {
        let mut source = FrameSource::new(64, 48);
        source.attach(stream(128, 96));
        let frame = source.capture().unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
        assert_eq!(source.frames_captured(), 1);
    }

    #[test]
    fn capture_fails_once_tracks_stop() {
        let mut source = FrameSource::new(32, 24);
        let handle = stream(32, 24);
        source.attach(handle.clone());
        handle.stop_all();
        assert!(source.capture().is_err());
        assert!(source.detach().is_some());
        assert!(!source.is_attached());
    }
}

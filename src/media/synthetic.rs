//! Synthetic camera (`stub://` URLs).
//!
//! Produces a deterministic moving scene so the loop can run without hardware.
//! `stub://denied` simulates a user refusing camera access.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rand::Rng;

use super::{AcquisitionError, MediaConstraints, MediaDevices, MediaStream, TrackState, VideoTrack};
use crate::frame::Frame;

/// URL that makes acquisition fail as if permission were refused.
pub const DENIED_URL: &str = "stub://denied";

pub struct SyntheticDevices {
    url: String,
}

impl SyntheticDevices {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

impl MediaDevices for SyntheticDevices {
    fn get_user_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, AcquisitionError> {
        constraints.check()?;
        if self.url == DENIED_URL {
            return Err(AcquisitionError::Denied(format!(
                "{} refused camera access",
                self.url
            )));
        }
        let track = SyntheticTrack::new(&self.url, constraints.width, constraints.height);
        log::info!(
            "synthetic camera {} opened at {}x{}",
            self.url,
            constraints.width,
            constraints.height
        );
        Ok(MediaStream::new(vec![Arc::new(track)]))
    }
}

struct SyntheticTrack {
    label: String,
    width: u32,
    height: u32,
    started: Instant,
    ended: AtomicBool,
}

impl SyntheticTrack {
    fn new(url: &str, width: u32, height: u32) -> Self {
        Self {
            label: url.to_string(),
            width,
            height,
            started: Instant::now(),
            ended: AtomicBool::new(false),
        }
    }

    /// Background gradient with a bright square drifting across the scene,
    /// sprinkled with a little sensor noise.
    fn render_scene(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let t = self.started.elapsed().as_millis() as usize;
        let side = (w.min(h) / 4).max(1);
        let left = (t / 20) % w.saturating_sub(side).max(1);
        let top = h.saturating_sub(side) / 2;

        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; w * h * 3];
        for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
            let (x, y) = (i % w, i / w);
            let inside = x >= left && x < left + side && y >= top && y < top + side;
            let noise: u8 = rng.gen_range(0..8);
            if inside {
                px.copy_from_slice(&[230 - noise, 200 - noise, 170 - noise]);
            } else {
                px[0] = ((x * 255) / w.max(1)) as u8 / 2 + noise;
                px[1] = ((y * 255) / h.max(1)) as u8 / 2 + noise;
                px[2] = 60 + noise;
            }
        }
        pixels
    }
}

impl VideoTrack for SyntheticTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> TrackState {
        if self.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn current_frame(&self) -> Result<Frame> {
        if self.ready_state() == TrackState::Ended {
            return Err(anyhow!("track {} has ended", self.label));
        }
        Frame::from_rgb(self.width, self.height, self.render_scene())
    }

    fn stop(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            log::info!("synthetic camera {} stopped", self.label);
        }
    }
}

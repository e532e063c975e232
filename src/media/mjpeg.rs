//! HTTP camera (`http(s)://` URLs).
//!
//! Supports two camera styles:
//! - multipart MJPEG streams: a reader thread decodes frames as they arrive and
//!   keeps only the latest one, so capture always sees current content
//! - single-JPEG snapshot endpoints: every capture fetches a fresh snapshot
//!
//! Frames are decoded in memory and never written anywhere.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use image::RgbImage;

use super::{AcquisitionError, MediaConstraints, MediaDevices, MediaStream, TrackState, VideoTrack};
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const READ_CHUNK_BYTES: usize = 8192;

pub struct MjpegDevices {
    url: String,
    agent: ureq::Agent,
}

impl MjpegDevices {
    /// `timeout` bounds connecting and each individual read; a stalled camera
    /// ends the track instead of hanging the reader forever.
    pub fn new(url: impl Into<String>, timeout: Option<Duration>) -> Self {
        let mut builder = ureq::AgentBuilder::new();
        if let Some(timeout) = timeout {
            builder = builder.timeout_connect(timeout).timeout_read(timeout);
        }
        Self {
            url: url.into(),
            agent: builder.build(),
        }
    }
}

impl MediaDevices for MjpegDevices {
    fn get_user_media(
        &mut self,
        constraints: &MediaConstraints,
    ) -> Result<MediaStream, AcquisitionError> {
        constraints.check()?;
        let response = self.agent.get(&self.url).call().map_err(|err| match err {
            ureq::Error::Status(code @ (401 | 403), _) => {
                AcquisitionError::Denied(format!("{} answered {}", self.url, code))
            }
            ureq::Error::Status(code, _) => {
                AcquisitionError::Unavailable(format!("{} answered {}", self.url, code))
            }
            ureq::Error::Transport(transport) => {
                AcquisitionError::Unavailable(format!("{}: {}", self.url, transport))
            }
        })?;

        let content_type = response
            .header("Content-Type")
            .unwrap_or("")
            .to_lowercase();
        let shared = Arc::new(Shared::default());

        let track = if content_type.contains("multipart") {
            let mut stream = MjpegStream::new(response.into_reader());
            let first = stream
                .read_next_jpeg()
                .and_then(|jpeg| decode_rgb(&jpeg))
                .map_err(|err| AcquisitionError::Unavailable(format!("{}: {:#}", self.url, err)))?;
            shared.store(first);
            spawn_reader(self.url.clone(), stream, shared.clone())
                .map_err(|err| AcquisitionError::Unavailable(format!("{:#}", err)))?;
            HttpTrack {
                label: self.url.clone(),
                mode: HttpMode::Mjpeg,
                agent: self.agent.clone(),
                shared,
            }
        } else {
            let mut body = Vec::new();
            response
                .into_reader()
                .take(MAX_JPEG_BYTES as u64)
                .read_to_end(&mut body)
                .map_err(|err| AcquisitionError::Unavailable(format!("{}: {}", self.url, err)))?;
            if body.is_empty() {
                return Err(AcquisitionError::Unavailable(format!(
                    "{} returned an empty snapshot",
                    self.url
                )));
            }
            HttpTrack {
                label: self.url.clone(),
                mode: HttpMode::Snapshot,
                agent: self.agent.clone(),
                shared,
            }
        };

        log::info!(
            "http camera {} opened ({})",
            self.url,
            match track.mode {
                HttpMode::Mjpeg => "mjpeg",
                HttpMode::Snapshot => "snapshot",
            }
        );
        Ok(MediaStream::new(vec![Arc::new(track)]))
    }
}

#[derive(Default)]
struct Shared {
    latest: Mutex<Option<RgbImage>>,
    ended: AtomicBool,
}

impl Shared {
    fn store(&self, image: RgbImage) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(image);
        }
    }

    fn latest(&self) -> Result<RgbImage> {
        let slot = self
            .latest
            .lock()
            .map_err(|_| anyhow!("latest frame lock poisoned"))?;
        slot.clone()
            .ok_or_else(|| anyhow!("no frame received from camera yet"))
    }
}

enum HttpMode {
    Mjpeg,
    Snapshot,
}

struct HttpTrack {
    label: String,
    mode: HttpMode,
    agent: ureq::Agent,
    shared: Arc<Shared>,
}

impl VideoTrack for HttpTrack {
    fn label(&self) -> &str {
        &self.label
    }

    fn ready_state(&self) -> TrackState {
        if self.shared.ended.load(Ordering::SeqCst) {
            TrackState::Ended
        } else {
            TrackState::Live
        }
    }

    fn current_frame(&self) -> Result<Frame> {
        if self.ready_state() == TrackState::Ended {
            return Err(anyhow!("track {} has ended", self.label));
        }
        match self.mode {
            HttpMode::Mjpeg => Ok(Frame::new(self.shared.latest()?)),
            HttpMode::Snapshot => {
                let jpeg = fetch_single_jpeg(&self.agent, &self.label)?;
                Frame::decode(&jpeg)
            }
        }
    }

    fn stop(&self) {
        if !self.shared.ended.swap(true, Ordering::SeqCst) {
            // The reader thread notices on its next frame boundary and exits.
            log::info!("http camera {} stopped", self.label);
            if let Ok(mut slot) = self.shared.latest.lock() {
                *slot = None;
            }
        }
    }
}

fn spawn_reader(label: String, mut stream: MjpegStream, shared: Arc<Shared>) -> Result<()> {
    std::thread::Builder::new()
        .name("mjpeg-reader".to_string())
        .spawn(move || {
            while !shared.ended.load(Ordering::SeqCst) {
                match stream.read_next_jpeg().and_then(|jpeg| decode_rgb(&jpeg)) {
                    Ok(image) => {
                        if !shared.ended.load(Ordering::SeqCst) {
                            shared.store(image);
                        }
                    }
                    Err(err) => {
                        if !shared.ended.swap(true, Ordering::SeqCst) {
                            log::warn!("http camera {} ended: {:#}", label, err);
                        }
                        break;
                    }
                }
            }
        })
        .context("spawn mjpeg reader thread")?;
    Ok(())
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; READ_CHUNK_BYTES];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let jpeg = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(jpeg);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

fn fetch_single_jpeg(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

fn decode_rgb(jpeg: &[u8]) -> Result<RgbImage> {
    let image = image::load_from_memory(jpeg).context("decode camera jpeg")?;
    Ok(image.into_rgb8())
}

/// Locate the first complete JPEG (SOI .. EOI) in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

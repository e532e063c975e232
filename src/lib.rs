//! moodcam
//!
//! A client-side capture/annotate loop: acquire a live video stream, sample
//! frames on a fixed cadence, send each frame to a remote analysis service,
//! and overlay the returned labeled regions on a live display.
//!
//! # Module Structure
//!
//! - `media`: acquisition boundary (devices, stream handles, tracks)
//! - `source`: `FrameSource`, samples the attached stream on demand
//! - `analysis`: `AnnotationClient` and its transports (HTTP, stub)
//! - `render`: `Renderer` and display surfaces
//! - `capture_loop`: the capture → dispatch → render → wait cycle
//! - `controller`: start/stop lifecycle and teardown
//! - `config`: file/env configuration
//!
//! Analysis failures never stop the loop; a frame whose analysis fails is
//! rendered without annotations.

use anyhow::{Context, Result};

pub mod analysis;
pub mod annotation;
pub mod capture_loop;
pub mod config;
pub mod controller;
pub mod frame;
pub mod media;
pub mod render;
pub mod source;

pub use analysis::{AnalysisError, AnalysisTransport, AnnotationClient, HttpTransport, StubTransport};
pub use annotation::{AnalysisRequest, AnalysisResponse, Annotation, BoundingBox};
pub use capture_loop::{
    CaptureLoop, LoopState, LoopStateHandle, LoopStats, LoopStatsHandle, LoopTiming,
};
pub use config::MoodcamConfig;
pub use controller::{ControllerError, LifecycleController};
pub use frame::Frame;
pub use media::{
    AcquisitionError, MediaConstraints, MediaDevices, MediaStream, TrackState, VideoTrack,
};
pub use render::{Canvas, OverlayStyle, Renderer, Surface};
pub use source::FrameSource;

/// Wire a controller from configuration: device backend and analysis
/// transport by URL scheme, a `Canvas` display, and the configured pacing.
pub fn controller_from_config(cfg: &MoodcamConfig) -> Result<LifecycleController> {
    let devices = media::devices_for_url(&cfg.source.url, cfg.analysis.timeout)
        .with_context(|| format!("open media source {}", cfg.source.url))?;
    let transport = analysis::transport_for_url(&cfg.analysis.url, cfg.analysis.timeout)?;
    let client = AnnotationClient::new(transport).with_jpeg_quality(cfg.analysis.jpeg_quality);

    let (width, height) = (cfg.source.width, cfg.source.height);
    let mut canvas = Canvas::new(width, height);
    if let Some(path) = &cfg.display.preview_path {
        canvas = canvas.with_preview_path(path);
    }
    let style = OverlayStyle {
        text_scale: cfg.display.label_scale,
        ..OverlayStyle::default()
    };
    let renderer = Renderer::with_style(Box::new(canvas), style);

    let capture_loop = CaptureLoop::new(
        FrameSource::new(width, height),
        client,
        renderer,
        LoopTiming {
            delay: cfg.capture_loop.delay,
            refresh_hz: cfg.capture_loop.refresh_hz,
        },
    );
    Ok(LifecycleController::new(
        devices,
        MediaConstraints::video_only(width, height),
        capture_loop,
    ))
}

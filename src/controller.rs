//! Start/stop lifecycle around the capture loop.
//!
//! The controller owns the stream handle and, while idle, the capture loop's
//! components. `start` moves the components onto a worker thread; `stop`
//! waits for the worker to hand them back before tearing anything down, so
//! an in-flight render always completes before the display is cleared.

use std::sync::mpsc;
use std::thread::{Builder, JoinHandle};

use thiserror::Error;

use crate::capture_loop::{CaptureLoop, LoopState, LoopStateHandle, LoopStats, LoopStatsHandle};
use crate::media::{AcquisitionError, MediaConstraints, MediaDevices, MediaStream};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Acquisition(#[from] AcquisitionError),

    #[error("failed to spawn capture loop worker: {0}")]
    Spawn(String),

    #[error("capture loop was lost when its worker panicked")]
    LoopLost,
}

pub struct LifecycleController {
    devices: Box<dyn MediaDevices>,
    constraints: MediaConstraints,
    state: LoopStateHandle,
    stats: LoopStatsHandle,
    idle_loop: Option<CaptureLoop>,
    worker: Option<JoinHandle<Option<CaptureLoop>>>,
    stream: Option<MediaStream>,
}

impl LifecycleController {
    pub fn new(
        devices: Box<dyn MediaDevices>,
        constraints: MediaConstraints,
        capture_loop: CaptureLoop,
    ) -> Self {
        Self {
            devices,
            constraints,
            state: LoopStateHandle::new(),
            stats: capture_loop.stats_handle(),
            idle_loop: Some(capture_loop),
            worker: None,
            stream: None,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state.get()
    }

    /// Read-only view of the loop state that can be watched from other threads.
    pub fn state_handle(&self) -> LoopStateHandle {
        self.state.clone()
    }

    /// True while a stream is held and at least one of its tracks is live.
    pub fn is_streaming(&self) -> bool {
        self.stream.as_ref().is_some_and(|s| s.is_active())
    }

    /// The capture loop, available while idle.
    pub fn capture_loop(&self) -> Option<&CaptureLoop> {
        self.idle_loop.as_ref()
    }

    /// Loop counters, live while the loop runs.
    pub fn stats(&self) -> LoopStats {
        self.stats.snapshot()
    }

    pub fn stats_handle(&self) -> LoopStatsHandle {
        self.stats.clone()
    }

    /// Acquire a stream and start the capture loop.
    ///
    /// Calling `start` while running is a no-op. If acquisition fails the
    /// controller stays `Idle` and holds nothing.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        self.start_on(Builder::new().name("capture-loop".to_string()))
    }

    fn start_on(&mut self, builder: Builder) -> Result<(), ControllerError> {
        if self.state.get() != LoopState::Idle {
            log::warn!("start ignored: capture loop is {:?}", self.state.get());
            return Ok(());
        }
        if self.idle_loop.is_none() {
            return Err(ControllerError::LoopLost);
        }

        let stream = match self.devices.get_user_media(&self.constraints) {
            Ok(stream) => stream,
            Err(err) => {
                log::error!("stream acquisition failed: {}", err);
                return Err(err.into());
            }
        };

        // The worker receives the loop only once it exists, so a failed spawn
        // leaves the loop with the controller.
        let (handoff, inbox) = mpsc::channel::<CaptureLoop>();
        let state = self.state.clone();
        let worker = match builder.spawn(move || {
            let capture = inbox.recv().ok()?;
            Some(capture.run(&state))
        }) {
            Ok(worker) => worker,
            Err(err) => {
                stream.stop_all();
                log::error!("capture loop worker failed to start: {}", err);
                return Err(ControllerError::Spawn(err.to_string()));
            }
        };

        let Some(mut capture) = self.idle_loop.take() else {
            stream.stop_all();
            return Err(ControllerError::LoopLost);
        };
        capture.source_mut().attach(stream.clone());
        log::info!(
            "acquired {} with {} track(s)",
            stream.id(),
            stream.tracks().len()
        );
        self.state.set(LoopState::Running);

        if let Err(mpsc::SendError(mut capture)) = handoff.send(capture) {
            self.state.set(LoopState::Idle);
            capture.source_mut().detach();
            self.idle_loop = Some(capture);
            stream.stop_all();
            let _ = worker.join();
            log::error!("capture loop worker exited before receiving the loop");
            return Err(ControllerError::Spawn("worker exited early".to_string()));
        }
        self.stream = Some(stream);
        self.worker = Some(worker);
        Ok(())
    }

    /// Stop the loop and release the stream. Idempotent.
    ///
    /// Blocks until the in-flight cycle (if any) has rendered, then stops all
    /// tracks, detaches the stream from the frame source and clears the
    /// display.
    pub fn stop(&mut self) {
        if self.worker.is_none() && self.stream.is_none() {
            self.state.set(LoopState::Idle);
            return;
        }
        self.state.set(LoopState::Stopping);

        if let Some(worker) = self.worker.take() {
            match worker.join() {
                Ok(Some(capture)) => self.idle_loop = Some(capture),
                Ok(None) => log::error!("capture loop worker never received its loop"),
                Err(_) => log::error!("capture loop worker panicked; its components are lost"),
            }
        }

        let stream = self.stream.take();
        if let Some(stream) = &stream {
            stream.stop_all();
        }
        if let Some(capture) = self.idle_loop.as_mut() {
            capture.source_mut().detach();
            capture.renderer_mut().clear();
        }
        if let Some(stream) = stream {
            log::info!("released {}", stream.id());
        }

        self.state.set(LoopState::Idle);
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnnotationClient, StubTransport};
    use crate::capture_loop::LoopTiming;
    use crate::media::SyntheticDevices;
    use crate::render::{Canvas, Renderer};
    use crate::source::FrameSource;
    use std::time::Duration;

    fn controller() -> LifecycleController {
        let capture_loop = CaptureLoop::new(
            FrameSource::new(32, 24),
            AnnotationClient::new(Box::new(StubTransport::new())),
            Renderer::new(Box::new(Canvas::new(32, 24))),
            LoopTiming {
                delay: Duration::from_millis(5),
                refresh_hz: 240,
            },
        );
        LifecycleController::new(
            Box::new(SyntheticDevices::new("stub://webcam")),
            MediaConstraints::video_only(32, 24),
            capture_loop,
        )
    }

    #[test]
    fn failed_spawn_keeps_loop_for_next_start() {
        let mut controller = controller();
        // No address space can hold this stack, so the spawn is refused.
        let err = controller
            .start_on(Builder::new().stack_size(1 << 62))
            .unwrap_err();
        assert!(matches!(err, ControllerError::Spawn(_)));
        assert_eq!(controller.state(), LoopState::Idle);
        assert!(!controller.is_streaming());
        let capture = controller.capture_loop().expect("loop kept");
        assert!(!capture.source().is_attached());

        controller.start().unwrap();
        assert_eq!(controller.state(), LoopState::Running);
        controller.stop();
        assert_eq!(controller.state(), LoopState::Idle);
        assert!(controller.capture_loop().is_some());
    }
}

//! The capture → dispatch → render cycle.
//!
//! Cycles run strictly one after another on a single worker thread:
//! 1. capture the current frame
//! 2. analyze it (blocking; failures yield no annotations)
//! 3. render frame + annotations
//! 4. wait the inter-cycle delay, which caps the analysis request rate
//! 5. if still running, wait for the next repaint tick and go again
//!
//! A second analyze call therefore never starts before the previous render has
//! finished. Cancellation is cooperative: flipping the shared state lets the
//! in-flight cycle finish, and no further cycle starts.
//!
//! A panic inside one cycle is contained and counted; the loop carries on
//! with the next cycle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analysis::AnnotationClient;
use crate::render::Renderer;
use crate::source::FrameSource;

pub const DEFAULT_CYCLE_DELAY: Duration = Duration::from_millis(200);
pub const DEFAULT_REFRESH_HZ: u32 = 60;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Running,
    Stopping,
}

impl LoopState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LoopState::Running,
            2 => LoopState::Stopping,
            _ => LoopState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            LoopState::Idle => 0,
            LoopState::Running => 1,
            LoopState::Stopping => 2,
        }
    }
}

/// Shared view of the loop state. Only the controller changes it.
#[derive(Clone, Debug)]
pub struct LoopStateHandle(Arc<AtomicU8>);

impl LoopStateHandle {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(LoopState::Idle.as_u8())))
    }

    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.get() == LoopState::Running
    }

    pub(crate) fn set(&self, state: LoopState) {
        self.0.store(state.as_u8(), Ordering::SeqCst);
    }
}

impl Default for LoopStateHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Delay and repaint pacing for the loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LoopTiming {
    pub delay: Duration,
    pub refresh_hz: u32,
}

impl Default for LoopTiming {
    fn default() -> Self {
        Self {
            delay: DEFAULT_CYCLE_DELAY,
            refresh_hz: DEFAULT_REFRESH_HZ,
        }
    }
}

/// Display refresh ticks, used to align each new cycle with the next repaint.
#[derive(Clone, Debug)]
pub struct RepaintClock {
    origin: Instant,
    interval: Duration,
}

impl RepaintClock {
    pub fn new(refresh_hz: u32) -> Self {
        let hz = refresh_hz.max(1) as u64;
        Self {
            origin: Instant::now(),
            interval: Duration::from_nanos(1_000_000_000 / hz),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Time left until the next tick boundary. Never zero: a call landing
    /// exactly on a tick waits for the following one.
    pub fn until_next_repaint(&self) -> Duration {
        let interval = self.interval.as_nanos().max(1);
        let elapsed = self.origin.elapsed().as_nanos();
        let next = (elapsed / interval + 1) * interval;
        Duration::from_nanos((next - elapsed) as u64)
    }

    pub fn wait_for_next_repaint(&self) {
        std::thread::sleep(self.until_next_repaint());
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Cycles that reached the render step.
    pub cycles: u64,
    /// Cycles rendered without annotations because analysis failed.
    pub fallbacks: u64,
    /// Cycles skipped because no frame could be captured.
    pub capture_errors: u64,
    /// Cycles abandoned because a component panicked.
    pub panics: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cycles: AtomicU64,
    fallbacks: AtomicU64,
    capture_errors: AtomicU64,
    panics: AtomicU64,
}

/// Live view of the loop counters, readable from any thread while the loop runs.
#[derive(Clone, Debug, Default)]
pub struct LoopStatsHandle(Arc<Counters>);

impl LoopStatsHandle {
    pub fn snapshot(&self) -> LoopStats {
        LoopStats {
            cycles: self.0.cycles.load(Ordering::Relaxed),
            fallbacks: self.0.fallbacks.load(Ordering::Relaxed),
            capture_errors: self.0.capture_errors.load(Ordering::Relaxed),
            panics: self.0.panics.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct CaptureLoop {
    source: FrameSource,
    client: AnnotationClient,
    renderer: Renderer,
    delay: Duration,
    clock: RepaintClock,
    stats: LoopStatsHandle,
}

impl CaptureLoop {
    pub fn new(
        source: FrameSource,
        client: AnnotationClient,
        renderer: Renderer,
        timing: LoopTiming,
    ) -> Self {
        Self {
            source,
            client,
            renderer,
            delay: timing.delay,
            clock: RepaintClock::new(timing.refresh_hz),
            stats: LoopStatsHandle::default(),
        }
    }

    pub fn source(&self) -> &FrameSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut FrameSource {
        &mut self.source
    }

    pub fn client(&self) -> &AnnotationClient {
        &self.client
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer {
        &mut self.renderer
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.snapshot()
    }

    /// Shared handle to the counters; stays valid while the loop runs on
    /// another thread.
    pub fn stats_handle(&self) -> LoopStatsHandle {
        self.stats.clone()
    }

    /// One capture → analyze → render pass. Returns false when nothing could
    /// be captured, in which case neither analysis nor render happens.
    pub fn run_cycle(&mut self) -> bool {
        let frame = match self.source.capture() {
            Ok(frame) => frame,
            Err(err) => {
                LoopStatsHandle::bump(&self.stats.0.capture_errors);
                log::warn!("frame capture failed: {:#}", err);
                return false;
            }
        };

        let failures_before = self.client.failures();
        let annotations = self.client.analyze(&frame);
        if self.client.failures() > failures_before {
            LoopStatsHandle::bump(&self.stats.0.fallbacks);
        }

        self.renderer.render(&frame, &annotations);
        LoopStatsHandle::bump(&self.stats.0.cycles);
        true
    }

    /// `run_cycle` with panics contained. A panicking cycle counts as
    /// neither rendered nor captured.
    fn run_guarded_cycle(&mut self) {
        if panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle())).is_err() {
            LoopStatsHandle::bump(&self.stats.0.panics);
            log::error!("capture cycle panicked; continuing with the next cycle");
        }
    }

    /// Run cycles until `state` leaves `Running`, then hand the loop back.
    pub fn run(mut self, state: &LoopStateHandle) -> Self {
        log::info!(
            "capture loop started (delay {}ms, repaint every {:?})",
            self.delay.as_millis(),
            self.clock.interval()
        );
        let mut last_health_log = Instant::now();

        while state.is_running() {
            self.run_guarded_cycle();

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = self.stats();
                log::info!(
                    "capture loop health: cycles={} fallbacks={} capture_errors={} panics={} frames={}",
                    stats.cycles,
                    stats.fallbacks,
                    stats.capture_errors,
                    stats.panics,
                    self.source.frames_captured()
                );
                last_health_log = Instant::now();
            }

            std::thread::sleep(self.delay);
            if !state.is_running() {
                break;
            }
            self.clock.wait_for_next_repaint();
        }

        let stats = self.stats();
        log::info!(
            "capture loop exited after {} cycle(s) ({} without annotations, {} capture errors, {} panics)",
            stats.cycles,
            stats.fallbacks,
            stats.capture_errors,
            stats.panics
        );
        self
    }
}

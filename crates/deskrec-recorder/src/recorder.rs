//! `Recorder` — lifecycle and pacing for one recording session.
//!
//! ```text
//!        start()                      stop()
//! Idle ─────────► Starting ──► Running ─────► Stopping ──► Idle
//!                    │ any failure unwinds ▲
//!                    └─────────► Idle      │ capture lost / encode failed
//!                                          │ (pacing loop ends by itself)
//! ```
//!
//! Two threads run per session: the capture thread inside [`FrameSource`] and
//! the pacing thread here, which owns the [`FrameEncoder`] until `stop()`
//! joins it. Teardown runs in reverse construction order: pacing loop, encoder
//! flush and close, acquisition loop, capture device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use deskrec_capture::{CaptureBackend, CaptureOptions, FrameBuffer, FrameSource};
use deskrec_core::{DeskrecError, RecordingConfig, Result, SessionState};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::codec::VideoCodec;
use crate::container::ContainerFormat;
use crate::encoder::FrameEncoder;
use crate::pacing::{Pacer, PacingStats};

// ── Public types ──────────────────────────────────────────────────────────────

/// Why a session's pacing loop ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EndReason {
    /// `stop()` was called.
    Stopped,
    /// The capture thread exited, e.g. on a terminal acquire timeout.
    CaptureLost,
    /// `encode_frame` failed.
    EncodeFailed(String),
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::CaptureLost => f.write_str("capture lost"),
            Self::EncodeFailed(reason) => write!(f, "encode failed: {reason}"),
        }
    }
}

/// Status updates pushed to the front-end.
#[derive(Debug, Clone, PartialEq)]
pub enum RecorderEvent {
    State(SessionState),
    /// Once per second of target frames.
    Progress { frames: u64, fps: f32 },
    Ended { reason: EndReason },
}

/// Summary returned by [`Recorder::stop`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordingStats {
    pub frames_encoded:  u64,
    pub packets_written: u64,
    pub frames_captured: u64,
    pub duration:        Duration,
    pub pacing:          PacingStats,
    pub end_reason:      EndReason,
}

// ── Recorder ──────────────────────────────────────────────────────────────────

pub struct Recorder {
    config:    RecordingConfig,
    backend:   Arc<dyn CaptureBackend>,
    codec:     Arc<dyn VideoCodec>,
    container: Arc<dyn ContainerFormat>,
    state:     Arc<Mutex<SessionState>>,
    events:    Option<mpsc::Sender<RecorderEvent>>,
    session:   Option<ActiveSession>,
}

struct ActiveSession {
    source:  FrameSource,
    running: Arc<AtomicBool>,
    pacing:  JoinHandle<PacingOutcome>,
    started: Instant,
}

struct PacingOutcome {
    encoder: FrameEncoder,
    stats:   PacingStats,
    reason:  EndReason,
}

impl Recorder {
    pub fn new(
        config: RecordingConfig,
        backend: Arc<dyn CaptureBackend>,
        codec: Arc<dyn VideoCodec>,
        container: Arc<dyn ContainerFormat>,
    ) -> Self {
        Self {
            config,
            backend,
            codec,
            container,
            state: Arc::new(Mutex::new(SessionState::Idle)),
            events: None,
            session: None,
        }
    }

    /// Deliver [`RecorderEvent`]s to `tx`. Events are dropped when it is full.
    pub fn with_events(mut self, tx: mpsc::Sender<RecorderEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    /// Build the pipeline and start recording. No-op unless `Idle`.
    ///
    /// On failure everything constructed so far is released and the recorder
    /// is back in `Idle`.
    pub fn start(&mut self) -> Result<()> {
        if self.session.is_some() || self.state().is_active() {
            debug!(state = %self.state(), "[Recorder] start() ignored");
            return Ok(());
        }
        self.config.validate()?;
        self.transition(SessionState::Starting);

        match self.build_session() {
            Ok(session) => {
                self.session = Some(session);
                self.transition(SessionState::Running);
                info!(
                    surface = %self.config.surface,
                    output = %self.config.output.display(),
                    frame_interval_us = self.config.frame_interval_us(),
                    "[Recorder] recording"
                );
                Ok(())
            }
            Err(e) => {
                error!("[Recorder] start failed: {e}");
                self.transition(SessionState::Idle);
                Err(e)
            }
        }
    }

    /// Stop recording, flush the output and release everything.
    ///
    /// Returns `None` when there was no session.
    pub fn stop(&mut self) -> Result<Option<RecordingStats>> {
        let Some(session) = self.session.take() else {
            debug!("[Recorder] stop() ignored, not recording");
            return Ok(None);
        };
        self.transition(SessionState::Stopping);

        // 1. Pacing loop.
        session.running.store(false, Ordering::Release);
        let outcome = session.pacing.join();

        // 2. Encoder flush + close.
        let (closed, stats) = match outcome {
            Ok(PacingOutcome { mut encoder, stats, reason }) => {
                let closed = encoder.output_close();
                let summary = RecordingStats {
                    frames_encoded:  encoder.frames_submitted(),
                    packets_written: encoder.packets_written(),
                    frames_captured: 0,
                    duration:        session.started.elapsed(),
                    pacing:          stats,
                    end_reason:      reason,
                };
                (closed, Some(summary))
            }
            Err(_) => {
                error!("[Recorder] pacing thread panicked");
                (Err(DeskrecError::ThreadPanicked { thread: "deskrec-pacing".into() }), None)
            }
        };

        // 3. Acquisition loop, 4. capture device.
        let mut source = session.source;
        source.stop();
        let frames_captured = source.buffer().map_or(0, |b| b.frames_written());
        drop(source);

        self.transition(SessionState::Idle);

        let stats = stats.map(|s| RecordingStats { frames_captured, ..s });
        if let Some(s) = &stats {
            if s.end_reason == EndReason::Stopped {
                self.emit(RecorderEvent::Ended { reason: EndReason::Stopped });
            }
            info!(
                frames = s.frames_encoded,
                packets = s.packets_written,
                captured = s.frames_captured,
                secs = s.duration.as_secs_f64(),
                mean_slack_us = s.pacing.mean_slack_us(),
                overruns = s.pacing.overruns,
                "[Recorder] stopped ({})",
                s.end_reason
            );
        }
        closed?;
        Ok(stats)
    }

    fn build_session(&self) -> Result<ActiveSession> {
        let cfg = &self.config;

        let mut source = FrameSource::new(Arc::clone(&self.backend), CaptureOptions::from(cfg));
        let desc = source.initialize(&cfg.surface, cfg.target_fps)?;
        // Conversion reads B, G, R from the first three bytes of each pixel.
        if !desc.format.is_bgr_order() {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: format!("surface {} reports {}, expected a BGRA format", cfg.surface, desc.format),
            });
        }

        let mut encoder = FrameEncoder::new(Arc::clone(&self.codec), Arc::clone(&self.container))
            .with_gop_size(cfg.gop_size);
        encoder.initialize(desc.width, desc.height, desc.bytes_per_pixel, cfg.target_fps, cfg.bitrate_bps)?;

        source.start()?;
        encoder.output_open(&cfg.output)?;

        let buffer = source.buffer().ok_or(DeskrecError::NotInitialized)?;
        let running = Arc::new(AtomicBool::new(true));
        let ctx = PacingContext {
            buffer,
            running: Arc::clone(&running),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            target_fps: cfg.target_fps,
            headroom_fps: cfg.pacing_headroom_fps,
        };

        // On spawn failure the closure (and the encoder in it) is dropped
        // before `source`, which keeps the teardown order.
        let pacing = std::thread::Builder::new()
            .name("deskrec-pacing".into())
            .spawn(move || pacing_loop(encoder, ctx))
            .map_err(|e| DeskrecError::DeviceError { reason: format!("spawning pacing thread: {e}") })?;

        Ok(ActiveSession { source, running, pacing, started: Instant::now() })
    }

    fn transition(&self, next: SessionState) {
        *self.state.lock() = next;
        debug!("[Recorder] → {next}");
        self.emit(RecorderEvent::State(next));
    }

    fn emit(&self, event: RecorderEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("[Recorder] stop on drop failed: {e}");
        }
    }
}

// ── Pacing loop ───────────────────────────────────────────────────────────────

struct PacingContext {
    buffer:       Arc<FrameBuffer>,
    running:      Arc<AtomicBool>,
    state:        Arc<Mutex<SessionState>>,
    events:       Option<mpsc::Sender<RecorderEvent>>,
    target_fps:   u32,
    headroom_fps: u32,
}

impl PacingContext {
    fn emit(&self, event: RecorderEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.try_send(event);
        }
    }
}

fn pacing_loop(mut encoder: FrameEncoder, ctx: PacingContext) -> PacingOutcome {
    let mut pacer = Pacer::new(ctx.target_fps, ctx.headroom_fps);
    let mut frame = vec![0u8; ctx.buffer.len()];
    let report_every = ctx.target_fps.max(1) as u64;
    let mut reason = EndReason::Stopped;

    debug!(interval_us = pacer.interval().as_micros() as u64, "[Recorder] pacing loop started");

    while ctx.running.load(Ordering::Acquire) {
        let started = Instant::now();

        if ctx.buffer.is_closed() {
            reason = EndReason::CaptureLost;
            break;
        }
        let encoded = ctx
            .buffer
            .read_into(&mut frame)
            .and_then(|()| encoder.encode_frame(&frame));
        if let Err(e) = encoded {
            reason = EndReason::EncodeFailed(e.to_string());
            break;
        }

        pacer.pace(started);

        let ticks = pacer.stats().ticks;
        if ticks % report_every == 0 {
            let stats = pacer.stats();
            debug!(
                frames = encoder.frames_submitted(),
                fps = pacer.fps(),
                mean_slack_us = stats.mean_slack_us(),
                min_slack_us = stats.min_slack_us,
                overruns = stats.overruns,
                "[Recorder] pacing"
            );
            ctx.emit(RecorderEvent::Progress { frames: encoder.frames_submitted(), fps: pacer.fps() });
        }
    }

    if reason != EndReason::Stopped {
        warn!("[Recorder] session ended: {reason}");
        *ctx.state.lock() = SessionState::Stopping;
        ctx.emit(RecorderEvent::State(SessionState::Stopping));
        ctx.emit(RecorderEvent::Ended { reason: reason.clone() });
    }
    PacingOutcome { encoder, stats: pacer.stats(), reason }
}

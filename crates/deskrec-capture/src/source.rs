//! `FrameSource` — owns the capture session and the acquisition thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use deskrec_core::{DeskrecError, RecordingConfig, Result, SurfaceDescriptor};
use tracing::{debug, error, info, trace, warn};

use crate::{Acquire, CaptureBackend, CaptureDevice, FrameBuffer};

/// Upper bound on a single device wait, which bounds how long `stop()` takes.
pub const ACQUIRE_SLICE: Duration = Duration::from_millis(100);

// ── Options ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    /// Acquisition runs at `target_rate * capture_rate_multiplier`.
    pub capture_rate_multiplier: u32,
    /// Longest wait for one frame before the loop ends. `None` waits forever.
    pub acquire_timeout: Option<Duration>,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self { capture_rate_multiplier: 2, acquire_timeout: None }
    }
}

impl From<&RecordingConfig> for CaptureOptions {
    fn from(cfg: &RecordingConfig) -> Self {
        Self {
            capture_rate_multiplier: cfg.capture_rate_multiplier,
            acquire_timeout: cfg.acquire_timeout_ms.map(Duration::from_millis),
        }
    }
}

// ── FrameSource ───────────────────────────────────────────────────────────────

/// Keeps a [`FrameBuffer`] populated with the newest frame of one display.
///
/// Call [`initialize`](Self::initialize) to bind a surface, then
/// [`start`](Self::start) the acquisition thread. Dropping the source stops
/// the thread and releases the device.
pub struct FrameSource {
    backend: Arc<dyn CaptureBackend>,
    options: CaptureOptions,
    session: Option<Session>,
}

struct Session {
    descriptor:  SurfaceDescriptor,
    target_rate: u32,
    buffer:      Arc<FrameBuffer>,
    /// `None` while the acquisition thread owns the device.
    device:      Option<Box<dyn CaptureDevice>>,
    worker:      Option<Worker>,
}

struct Worker {
    running: Arc<AtomicBool>,
    handle:  JoinHandle<Box<dyn CaptureDevice>>,
}

impl FrameSource {
    pub fn new(backend: Arc<dyn CaptureBackend>, options: CaptureOptions) -> Self {
        Self { backend, options, session: None }
    }

    /// Bind to `surface_id` and allocate the frame buffer for its geometry.
    ///
    /// Re-initializing stops any running loop and releases the previous device.
    pub fn initialize(&mut self, surface_id: &str, target_rate: u32) -> Result<SurfaceDescriptor> {
        if target_rate == 0 {
            return Err(DeskrecError::InvalidRate { rate: target_rate });
        }
        if self.options.capture_rate_multiplier == 0 {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: "capture_rate_multiplier must be at least 1".into(),
            });
        }
        self.stop();
        self.session = None;

        let device = self.backend.open(surface_id)?;
        let descriptor = device.descriptor();
        descriptor.validate()?;

        info!(
            backend = self.backend.name(),
            surface = surface_id,
            "[FrameSource] bound {}",
            descriptor
        );

        self.session = Some(Session {
            descriptor,
            target_rate,
            buffer: Arc::new(FrameBuffer::new(descriptor.frame_len())),
            device: Some(device),
            worker: None,
        });
        Ok(descriptor)
    }

    /// Spawn the acquisition thread. No-op while it is already running.
    pub fn start(&mut self) -> Result<()> {
        let multiplier = self.options.capture_rate_multiplier;
        let acquire_timeout = self.options.acquire_timeout;
        let session = self.session.as_mut().ok_or(DeskrecError::NotInitialized)?;

        if let Some(worker) = &session.worker {
            if !worker.handle.is_finished() {
                debug!("[FrameSource] start() ignored, acquisition already running");
                return Ok(());
            }
        }
        session.reap();

        let device = session.device.take().ok_or_else(|| DeskrecError::DeviceError {
            reason: "capture device was lost by a previous acquisition loop".into(),
        })?;

        let period = Duration::from_micros(deskrec_core::config::capture_interval_us(
            session.target_rate,
            multiplier,
        ));
        let running = Arc::new(AtomicBool::new(true));
        session.buffer.reopen();

        let ctx = LoopContext {
            buffer: Arc::clone(&session.buffer),
            running: Arc::clone(&running),
            row_bytes: session.descriptor.row_bytes(),
            period,
            acquire_timeout,
        };
        let handle = std::thread::Builder::new()
            .name("deskrec-capture".into())
            .spawn(move || acquisition_loop(device, ctx))
            .map_err(|e| DeskrecError::DeviceError {
                reason: format!("spawning capture thread: {e}"),
            })?;

        info!(
            period_us = period.as_micros() as u64,
            "[FrameSource] acquisition started"
        );
        session.worker = Some(Worker { running, handle });
        Ok(())
    }

    /// Signal the acquisition thread and wait for it to exit.
    ///
    /// After this returns no acquisition is in flight. No-op when not running.
    pub fn stop(&mut self) {
        let Some(session) = self.session.as_mut() else { return };
        if session.worker.is_some() {
            session.reap();
            info!("[FrameSource] acquisition stopped");
        }
    }

    /// Copy the newest frame into `out`, which must be exactly
    /// `descriptor().frame_len()` bytes.
    pub fn read_latest(&self, out: &mut [u8]) -> Result<()> {
        let session = self.session.as_ref().ok_or(DeskrecError::NotInitialized)?;
        session.buffer.read_into(out)
    }

    pub fn descriptor(&self) -> Option<SurfaceDescriptor> {
        self.session.as_ref().map(|s| s.descriptor)
    }

    /// Shared handle to the frame slot, for consumers on other threads.
    pub fn buffer(&self) -> Option<Arc<FrameBuffer>> {
        self.session.as_ref().map(|s| Arc::clone(&s.buffer))
    }

    /// True while the acquisition thread is alive.
    pub fn is_running(&self) -> bool {
        self.session
            .as_ref()
            .and_then(|s| s.worker.as_ref())
            .is_some_and(|w| !w.handle.is_finished())
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl Session {
    /// Join a finished or stopping worker and take the device back.
    fn reap(&mut self) {
        let Some(worker) = self.worker.take() else { return };
        worker.running.store(false, Ordering::Release);
        match worker.handle.join() {
            Ok(device) => self.device = Some(device),
            Err(_) => error!("[FrameSource] capture thread panicked; device released"),
        }
    }
}

// ── Acquisition loop ──────────────────────────────────────────────────────────

struct LoopContext {
    buffer:          Arc<FrameBuffer>,
    running:         Arc<AtomicBool>,
    row_bytes:       usize,
    period:          Duration,
    acquire_timeout: Option<Duration>,
}

/// Closes the frame buffer when the loop exits, including by panic.
struct CloseOnExit(Arc<FrameBuffer>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

enum Wait {
    Frame,
    Stopped,
}

fn acquisition_loop(mut device: Box<dyn CaptureDevice>, ctx: LoopContext) -> Box<dyn CaptureDevice> {
    let _close = CloseOnExit(Arc::clone(&ctx.buffer));
    let mut frames: u64 = 0;

    while ctx.running.load(Ordering::Acquire) {
        let started = Instant::now();

        // Nothing is held on the first iteration.
        if let Err(e) = device.release_frame() {
            trace!("[FrameSource] release_frame: {e}");
        }

        match wait_for_frame(device.as_mut(), &ctx) {
            Ok(Wait::Frame) => frames += 1,
            Ok(Wait::Stopped) => break,
            Err(e) => {
                warn!(frames, "[FrameSource] acquisition ended: {e}");
                break;
            }
        }

        let spent = started.elapsed();
        if spent < ctx.period {
            std::thread::sleep(ctx.period - spent);
        }
    }

    if let Err(e) = device.release_frame() {
        trace!("[FrameSource] final release_frame: {e}");
    }
    debug!(frames, "[FrameSource] acquisition loop exited");
    device
}

/// Poll the device in [`ACQUIRE_SLICE`]s until a frame is copied into the
/// buffer, the run flag clears, or the cumulative wait exceeds the timeout.
fn wait_for_frame(device: &mut dyn CaptureDevice, ctx: &LoopContext) -> Result<Wait> {
    let mut waited = Duration::ZERO;

    loop {
        if !ctx.running.load(Ordering::Acquire) {
            return Ok(Wait::Stopped);
        }
        let slice = match ctx.acquire_timeout {
            Some(limit) => ACQUIRE_SLICE.min(limit.saturating_sub(waited)).max(Duration::from_millis(1)),
            None => ACQUIRE_SLICE,
        };

        let mut copied: Result<()> = Ok(());
        let outcome = device.acquire_frame(slice, &mut |mapped| {
            copied = ctx.buffer.write_rows(mapped.data, mapped.row_pitch, ctx.row_bytes);
        })?;

        match outcome {
            Acquire::Frame => {
                copied?;
                return Ok(Wait::Frame);
            }
            Acquire::TimedOut => {
                waited += slice;
                if let Some(limit) = ctx.acquire_timeout {
                    if waited >= limit {
                        return Err(DeskrecError::CaptureTimeout { ms: limit.as_millis() as u64 });
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::{SyntheticBackend, SyntheticSurface};

    fn init_test_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "debug".into()),
            )
            .with_test_writer()
            .try_init();
    }

    fn backend(surface: SyntheticSurface) -> Arc<SyntheticBackend> {
        Arc::new(SyntheticBackend::new(vec![surface]))
    }

    #[test]
    fn read_latest_before_initialize_fails() {
        let source = FrameSource::new(backend(SyntheticSurface::new("A", 4, 4)), CaptureOptions::default());
        let mut out = [0u8; 64];
        assert!(matches!(source.read_latest(&mut out), Err(DeskrecError::NotInitialized)));
    }

    #[test]
    fn start_before_initialize_fails() {
        let mut source = FrameSource::new(backend(SyntheticSurface::new("A", 4, 4)), CaptureOptions::default());
        assert!(matches!(source.start(), Err(DeskrecError::NotInitialized)));
    }

    #[test]
    fn initialize_reports_unknown_surface() {
        let mut source = FrameSource::new(backend(SyntheticSurface::new("A", 4, 4)), CaptureOptions::default());
        let err = source.initialize("B", 30).unwrap_err();
        assert!(matches!(err, DeskrecError::SurfaceNotFound { .. }));
        assert!(source.descriptor().is_none());
    }

    #[test]
    fn initialize_rejects_zero_rate() {
        let mut source = FrameSource::new(backend(SyntheticSurface::new("A", 4, 4)), CaptureOptions::default());
        assert!(matches!(source.initialize("A", 0), Err(DeskrecError::InvalidRate { rate: 0 })));
    }

    #[test]
    fn initialize_sizes_buffer_from_descriptor() {
        let mut source = FrameSource::new(backend(SyntheticSurface::new("A", 10, 6)), CaptureOptions::default());
        let desc = source.initialize("a", 30).unwrap();
        assert_eq!(desc.width, 10);
        assert_eq!(desc.height, 6);
        assert_eq!(desc.bytes_per_pixel, 4);
        assert_eq!(source.buffer().unwrap().len(), 10 * 6 * 4);
    }

    #[test]
    fn acquisition_copies_frames_without_padding() {
        init_test_tracing();
        let surface = SyntheticSurface::new("A", 8, 4)
            .with_row_padding(12)
            .with_refresh(Duration::from_millis(2));
        let backend = backend(surface.clone());
        let mut source = FrameSource::new(backend.clone(), CaptureOptions::default());
        source.initialize("A", 60).unwrap();
        source.start().unwrap();

        let buffer = source.buffer().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while buffer.frames_written() < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        source.stop();
        assert!(buffer.frames_written() >= 3, "capture produced no frames");

        let mut out = vec![0u8; buffer.len()];
        source.read_latest(&mut out).unwrap();
        let n = backend.frames_produced() - 1;
        for y in 0..4 {
            for x in 0..8 {
                let i = (y * 8 + x) * 4;
                assert_eq!(&out[i..i + 4], &surface.pixel(x as u32, y as u32, n), "pixel ({x},{y})");
            }
        }
        assert!(!out.contains(&SyntheticSurface::PADDING_BYTE));
    }

    #[test]
    fn start_twice_spawns_one_loop() {
        let backend = backend(SyntheticSurface::new("A", 4, 4).with_refresh(Duration::from_millis(5)));
        let mut source = FrameSource::new(backend.clone(), CaptureOptions::default());
        source.initialize("A", 30).unwrap();
        source.start().unwrap();
        source.start().unwrap();
        assert!(source.is_running());
        assert_eq!(backend.open_sessions(), 1);
        source.stop();
        assert!(!source.is_running());
    }

    #[test]
    fn stop_is_bounded_when_no_frames_arrive() {
        let backend = backend(SyntheticSurface::new("A", 4, 4).with_frame_limit(0));
        let mut source = FrameSource::new(backend, CaptureOptions::default());
        source.initialize("A", 30).unwrap();
        source.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let started = Instant::now();
        source.stop();
        assert!(started.elapsed() < ACQUIRE_SLICE * 3);
    }

    #[test]
    fn acquire_timeout_ends_the_loop_and_closes_buffer() {
        let backend = backend(SyntheticSurface::new("A", 4, 4).with_frame_limit(2));
        let options = CaptureOptions {
            acquire_timeout: Some(Duration::from_millis(50)),
            ..Default::default()
        };
        let mut source = FrameSource::new(backend, options);
        source.initialize("A", 60).unwrap();
        source.start().unwrap();

        let buffer = source.buffer().unwrap();
        let deadline = Instant::now() + Duration::from_secs(2);
        while !buffer.is_closed() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(buffer.is_closed());
        assert!(!source.is_running());
        assert_eq!(buffer.frames_written(), 2);

        // The device comes back on stop, so the loop can be restarted.
        source.stop();
        source.start().unwrap();
        source.stop();
    }

    #[test]
    fn drop_releases_the_device() {
        let backend = backend(SyntheticSurface::new("A", 4, 4));
        {
            let mut source = FrameSource::new(backend.clone(), CaptureOptions::default());
            source.initialize("A", 30).unwrap();
            source.start().unwrap();
            assert_eq!(backend.open_sessions(), 1);
        }
        assert_eq!(backend.open_sessions(), 0);
    }
}

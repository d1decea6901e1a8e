//! Synthetic capture backend.
//!
//! Renders a moving BGRA test pattern at a fixed refresh rate. Used on
//! platforms without desktop duplication and by the test suites. Rows are
//! optionally padded, like a mapped GPU staging texture, and each output can
//! only be duplicated by one session at a time.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use deskrec_core::{DeskrecError, PixelFormat, Result, Rotation, SurfaceDescriptor};
use parking_lot::Mutex;
use tracing::debug;

use crate::{Acquire, CaptureBackend, CaptureDevice, MappedFrame};

/// Description of one synthetic display output.
#[derive(Debug, Clone)]
pub struct SyntheticSurface {
    pub name:        String,
    pub width:       u32,
    pub height:      u32,
    /// Extra bytes at the end of every mapped row.
    pub row_padding: usize,
    /// Interval between new frames.
    pub refresh:     Duration,
    /// Stop producing frames after this many; later waits time out.
    pub frame_limit: Option<u64>,
}

impl SyntheticSurface {
    /// Value written into row padding.
    pub const PADDING_BYTE: u8 = 0xEE;

    pub fn new(name: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            name: name.into(),
            width,
            height,
            row_padding: 0,
            refresh: Duration::from_micros(16_667),
            frame_limit: None,
        }
    }

    pub fn with_row_padding(mut self, bytes: usize) -> Self {
        self.row_padding = bytes;
        self
    }

    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    pub fn descriptor(&self) -> SurfaceDescriptor {
        SurfaceDescriptor::new(self.width, self.height, PixelFormat::B8G8R8A8_UNORM, Rotation::Identity)
    }

    /// BGRA value of pixel `(x, y)` in frame `n`.
    pub fn pixel(&self, x: u32, y: u32, n: u64) -> [u8; 4] {
        let n = n as u32;
        [
            x.wrapping_add(n) as u8,
            y.wrapping_add(n.wrapping_mul(2)) as u8,
            (x ^ y) as u8,
            0xFF,
        ]
    }
}

// ── SyntheticBackend ──────────────────────────────────────────────────────────

pub struct SyntheticBackend {
    surfaces: Vec<SyntheticSurface>,
    /// Names of outputs with a live session.
    busy:     Arc<Mutex<Vec<String>>>,
    sessions: Arc<AtomicUsize>,
    produced: Arc<AtomicU64>,
}

impl SyntheticBackend {
    pub fn new(surfaces: Vec<SyntheticSurface>) -> Self {
        Self {
            surfaces,
            busy: Arc::new(Mutex::new(Vec::new())),
            sessions: Arc::new(AtomicUsize::new(0)),
            produced: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Devices currently open.
    pub fn open_sessions(&self) -> usize {
        self.sessions.load(Ordering::Acquire)
    }

    /// Frames rendered across all devices of this backend.
    pub fn frames_produced(&self) -> u64 {
        self.produced.load(Ordering::Acquire)
    }
}

impl CaptureBackend for SyntheticBackend {
    fn name(&self) -> &'static str {
        "synthetic"
    }

    fn surfaces(&self) -> Result<Vec<String>> {
        Ok(self.surfaces.iter().map(|s| s.name.clone()).collect())
    }

    fn open(&self, surface_id: &str) -> Result<Box<dyn CaptureDevice>> {
        let surface = self
            .surfaces
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(surface_id))
            .ok_or_else(|| DeskrecError::SurfaceNotFound { surface: surface_id.to_owned() })?;

        {
            let mut busy = self.busy.lock();
            if busy.iter().any(|name| name == &surface.name) {
                return Err(DeskrecError::DuplicationUnavailable {
                    reason: format!("{} is already being duplicated", surface.name),
                });
            }
            busy.push(surface.name.clone());
        }
        self.sessions.fetch_add(1, Ordering::AcqRel);

        let row_bytes = surface.descriptor().row_bytes();
        let pitch = row_bytes + surface.row_padding;
        debug!(surface = %surface.name, pitch, "synthetic device opened");

        Ok(Box::new(SyntheticDevice {
            surface:    surface.clone(),
            staging:    vec![SyntheticSurface::PADDING_BYTE; pitch * surface.height as usize],
            pitch,
            next_frame: Instant::now(),
            rendered:   0,
            held:       false,
            busy:       Arc::clone(&self.busy),
            sessions:   Arc::clone(&self.sessions),
            produced:   Arc::clone(&self.produced),
        }))
    }
}

// ── SyntheticDevice ───────────────────────────────────────────────────────────

struct SyntheticDevice {
    surface:    SyntheticSurface,
    staging:    Vec<u8>,
    pitch:      usize,
    next_frame: Instant,
    rendered:   u64,
    held:       bool,
    busy:       Arc<Mutex<Vec<String>>>,
    sessions:   Arc<AtomicUsize>,
    produced:   Arc<AtomicU64>,
}

impl SyntheticDevice {
    fn render(&mut self, n: u64) {
        let width = self.surface.width as usize;
        for (y, row) in self.staging.chunks_exact_mut(self.pitch).enumerate() {
            for (x, px) in row[..width * 4].chunks_exact_mut(4).enumerate() {
                px.copy_from_slice(&self.surface.pixel(x as u32, y as u32, n));
            }
        }
    }
}

impl CaptureDevice for SyntheticDevice {
    fn descriptor(&self) -> SurfaceDescriptor {
        self.surface.descriptor()
    }

    fn acquire_frame(
        &mut self,
        timeout: Duration,
        read: &mut dyn FnMut(MappedFrame<'_>),
    ) -> Result<Acquire> {
        if self.surface.frame_limit.is_some_and(|limit| self.rendered >= limit) {
            std::thread::sleep(timeout);
            return Ok(Acquire::TimedOut);
        }

        let now = Instant::now();
        if self.next_frame > now {
            let wait = self.next_frame - now;
            if wait > timeout {
                std::thread::sleep(timeout);
                return Ok(Acquire::TimedOut);
            }
            std::thread::sleep(wait);
        }
        self.next_frame = Instant::now() + self.surface.refresh;

        let n = self.produced.load(Ordering::Acquire);
        self.render(n);
        read(MappedFrame { data: &self.staging, row_pitch: self.pitch });
        self.produced.fetch_add(1, Ordering::AcqRel);
        self.rendered += 1;
        self.held = true;
        Ok(Acquire::Frame)
    }

    fn release_frame(&mut self) -> Result<()> {
        if !self.held {
            return Err(DeskrecError::DeviceError { reason: "no frame held".into() });
        }
        self.held = false;
        Ok(())
    }
}

impl Drop for SyntheticDevice {
    fn drop(&mut self) {
        self.busy.lock().retain(|name| name != &self.surface.name);
        self.sessions.fetch_sub(1, Ordering::AcqRel);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_matches_names_case_insensitively() {
        let backend = SyntheticBackend::new(vec![SyntheticSurface::new(r"\\.\DISPLAY1", 4, 2)]);
        let device = backend.open(r"\\.\display1").unwrap();
        assert_eq!(device.descriptor().frame_len(), 4 * 2 * 4);
        assert!(matches!(
            backend.open(r"\\.\DISPLAY9"),
            Err(DeskrecError::SurfaceNotFound { .. })
        ));
    }

    #[test]
    fn second_session_on_same_output_is_unavailable() {
        let backend = SyntheticBackend::new(vec![SyntheticSurface::new("A", 4, 2)]);
        let first = backend.open("A").unwrap();
        assert!(matches!(
            backend.open("A"),
            Err(DeskrecError::DuplicationUnavailable { .. })
        ));
        drop(first);
        assert!(backend.open("A").is_ok());
    }

    #[test]
    fn release_without_frame_fails_then_succeeds_after_acquire() {
        let backend = SyntheticBackend::new(vec![SyntheticSurface::new("A", 2, 2).with_row_padding(4)]);
        let mut device = backend.open("A").unwrap();
        assert!(device.release_frame().is_err());

        let mut pitch = 0;
        let mut len = 0;
        let outcome = device
            .acquire_frame(Duration::from_millis(100), &mut |mapped| {
                pitch = mapped.row_pitch;
                len = mapped.data.len();
            })
            .unwrap();
        assert_eq!(outcome, Acquire::Frame);
        assert_eq!(pitch, 2 * 4 + 4);
        assert_eq!(len, pitch * 2);
        device.release_frame().unwrap();
    }

    #[test]
    fn frame_limit_turns_into_timeouts() {
        let backend = SyntheticBackend::new(vec![SyntheticSurface::new("A", 2, 2).with_frame_limit(1)]);
        let mut device = backend.open("A").unwrap();
        let mut noop = |_: MappedFrame<'_>| {};
        assert_eq!(device.acquire_frame(Duration::from_millis(50), &mut noop).unwrap(), Acquire::Frame);
        assert_eq!(device.acquire_frame(Duration::from_millis(5), &mut noop).unwrap(), Acquire::TimedOut);
        assert_eq!(backend.frames_produced(), 1);
    }
}

//! deskrec-capture — desktop frame acquisition.
//!
//! Binds to one display output through a [`CaptureBackend`] and keeps a
//! [`FrameBuffer`] filled with the newest frame from a dedicated thread.
//!
//! # Windows pipeline
//!
//! ```text
//! D3D11CreateDevice (hardware → WARP → reference)
//!   │  IDXGIDevice::GetAdapter → EnumOutputs[DeviceName == surface]
//!   ▼
//! IDXGIOutput1::DuplicateOutput
//!   │  AcquireNextFrame (sliced wait)
//!   ▼
//! ID3D11Texture2D (GPU) → CopyResource → staging texture → Map
//!   │  row-by-row copy, RowPitch padding skipped
//!   ▼
//! FrameBuffer (BGRA8, latest wins) ──► FrameSource::read_latest()
//! ```
//!
//! On other targets only the synthetic backend is available.

use std::sync::Arc;
use std::time::Duration;

use deskrec_core::{Result, SurfaceDescriptor};

pub mod buffer;
pub mod source;
pub mod synthetic;

pub use buffer::FrameBuffer;
pub use source::{CaptureOptions, FrameSource};
pub use synthetic::{SyntheticBackend, SyntheticSurface};

// ── Platform split ─────────────────────────────────────────────────────────────

#[cfg(target_os = "windows")]
mod dxgi;
#[cfg(target_os = "windows")]
pub use dxgi::DxgiBackend;

// ── Device interface ───────────────────────────────────────────────────────────

/// A CPU-readable view of one captured frame.
///
/// Rows start every `row_pitch` bytes; the pitch may exceed the packed row
/// width when the device pads its rows.
#[derive(Debug, Clone, Copy)]
pub struct MappedFrame<'a> {
    pub data:      &'a [u8],
    pub row_pitch: usize,
}

/// Result of one bounded wait for a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquire {
    /// A frame was acquired and handed to the reader.
    Frame,
    /// No new frame arrived within the wait.
    TimedOut,
}

/// An open capture session on one display output.
pub trait CaptureDevice: Send {
    fn descriptor(&self) -> SurfaceDescriptor;

    /// Wait up to `timeout` for the next frame. On success the device copies
    /// the frame into CPU-readable memory and passes it to `read` before
    /// returning. The frame stays held until [`CaptureDevice::release_frame`].
    fn acquire_frame(
        &mut self,
        timeout: Duration,
        read: &mut dyn FnMut(MappedFrame<'_>),
    ) -> Result<Acquire>;

    /// Release the currently held frame. Fails when nothing is held, which
    /// callers are expected to ignore.
    fn release_frame(&mut self) -> Result<()>;
}

/// Opens capture devices for named display outputs.
pub trait CaptureBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Device names of the outputs this backend can capture.
    fn surfaces(&self) -> Result<Vec<String>>;

    /// Open an exclusive capture session on `surface_id`.
    fn open(&self, surface_id: &str) -> Result<Box<dyn CaptureDevice>>;
}

/// The platform's capture backend: DXGI on Windows, synthetic elsewhere.
pub fn default_backend() -> Arc<dyn CaptureBackend> {
    #[cfg(target_os = "windows")]
    {
        Arc::new(DxgiBackend::new())
    }
    #[cfg(not(target_os = "windows"))]
    {
        tracing::warn!("No desktop duplication on this platform; using the synthetic capture backend");
        Arc::new(SyntheticBackend::new(vec![SyntheticSurface::new(
            deskrec_core::config::DEFAULT_SURFACE,
            1920,
            1080,
        )]))
    }
}

//! `FrameEncoder` — raw frame in, container packets out.
//!
//! ```text
//! encode_frame(raw BGRA)
//!   │  bgra_to_i420 → PlanarFrame (allocated once)
//!   ▼
//! Compressor::submit(frame, pts = frames_submitted)
//!   │  receive_packet until NotReady
//!   ▼
//! Container::write_packet
//! ```
//!
//! `output_close` sends end of stream and drains the compressor completely
//! before the trailer is written.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use deskrec_core::{DeskrecError, Result};
use tracing::{debug, info, warn};

use crate::codec::{Compressor, EncoderSettings, PacketPoll, VideoCodec};
use crate::container::{Container, ContainerFormat};
use crate::convert::{bgra_to_i420, PlanarFrame};

/// Default keyframe interval in frames.
pub const DEFAULT_GOP_SIZE: u32 = 30;

/// Upper bound on the end-of-stream drain in `output_close`.
pub const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);

pub struct FrameEncoder {
    codec:            Arc<dyn VideoCodec>,
    format:           Arc<dyn ContainerFormat>,
    gop_size:         u32,
    session:          Option<EncodeSession>,
    output:           Option<Box<dyn Container>>,
    output_closed:    bool,
    frames_submitted: u64,
    packets_written:  u64,
}

struct EncodeSession {
    bytes_per_pixel: usize,
    frame_len:       usize,
    planar:          PlanarFrame,
    compressor:      Box<dyn Compressor>,
    /// End of stream has been submitted; the compressor accepts no more input.
    flushed:         bool,
}

impl FrameEncoder {
    pub fn new(codec: Arc<dyn VideoCodec>, format: Arc<dyn ContainerFormat>) -> Self {
        Self {
            codec,
            format,
            gop_size: DEFAULT_GOP_SIZE,
            session: None,
            output: None,
            output_closed: false,
            frames_submitted: 0,
            packets_written: 0,
        }
    }

    pub fn with_gop_size(mut self, gop_size: u32) -> Self {
        self.gop_size = gop_size.max(1);
        self
    }

    /// Open a compressor session for frames of the given geometry.
    ///
    /// All arguments are validated before anything is allocated.
    pub fn initialize(
        &mut self,
        width: u32,
        height: u32,
        bytes_per_pixel: u32,
        target_rate: u32,
        bitrate: u32,
    ) -> Result<()> {
        if width == 0 || height == 0 || bytes_per_pixel < 3 {
            return Err(DeskrecError::InvalidDimensions { width, height, bytes_per_pixel });
        }
        if target_rate == 0 {
            return Err(DeskrecError::InvalidRate { rate: target_rate });
        }
        if bitrate == 0 {
            return Err(DeskrecError::InvalidBitrate { bitrate });
        }
        if self.output.is_some() {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: "cannot re-initialize while the output is open".into(),
            });
        }

        let settings = EncoderSettings::new(width, height, target_rate, bitrate, self.gop_size);
        let compressor = self.codec.open(&settings)?;

        self.session = Some(EncodeSession {
            bytes_per_pixel: bytes_per_pixel as usize,
            frame_len: width as usize * height as usize * bytes_per_pixel as usize,
            planar: PlanarFrame::new(width, height),
            compressor,
            flushed: false,
        });
        self.output_closed = false;
        self.frames_submitted = 0;
        self.packets_written = 0;

        info!(
            codec = self.codec.name(),
            gop = self.gop_size,
            "[FrameEncoder] initialized {}×{} @{}fps {}bps",
            width, height, target_rate, bitrate
        );
        Ok(())
    }

    /// Create the container at `destination` and write its header.
    pub fn output_open(&mut self, destination: &Path) -> Result<()> {
        let session = self.session.as_ref().ok_or(DeskrecError::NotInitialized)?;
        let open_error = |reason: String| DeskrecError::OutputOpenError {
            destination: destination.display().to_string(),
            reason,
        };
        if self.output.is_some() {
            return Err(open_error("output already open".into()));
        }
        if session.flushed {
            return Err(open_error("encoder was flushed; initialize it again".into()));
        }

        let mut container = self.format.create(destination).map_err(|e| open_error(e.to_string()))?;
        container.write_header().map_err(|e| open_error(e.to_string()))?;

        self.output = Some(container);
        self.output_closed = false;
        info!(
            format = self.format.name(),
            "[FrameEncoder] output opened: {}",
            destination.display()
        );
        Ok(())
    }

    /// Convert, submit and drain one raw frame.
    pub fn encode_frame(&mut self, raw: &[u8]) -> Result<()> {
        let session = self.session.as_mut().ok_or(DeskrecError::NotInitialized)?;
        if raw.len() != session.frame_len {
            return Err(DeskrecError::FrameLengthMismatch {
                expected: session.frame_len,
                actual:   raw.len(),
            });
        }
        // After close the compressor itself rejects the frame.
        if self.output.is_none() && !session.flushed {
            return Err(DeskrecError::OutputNotOpen);
        }

        bgra_to_i420(raw, session.bytes_per_pixel, &mut session.planar)?;
        let pts = self.frames_submitted as i64;
        session.compressor.submit(&session.planar, pts)?;
        self.frames_submitted += 1;

        let output = self.output.as_deref_mut().ok_or(DeskrecError::OutputNotOpen)?;
        loop {
            match session.compressor.receive_packet()? {
                PacketPoll::Ready(packet) => {
                    output.write_packet(&packet)?;
                    self.packets_written += 1;
                }
                PacketPoll::NotReady | PacketPoll::Drained => break,
            }
        }
        Ok(())
    }

    /// Flush the compressor, write the trailer and release the destination.
    ///
    /// Calling it again after a successful close does nothing.
    pub fn output_close(&mut self) -> Result<()> {
        let Some(mut output) = self.output.take() else {
            return if self.output_closed { Ok(()) } else { Err(DeskrecError::OutputNotOpen) };
        };
        self.output_closed = true;

        let flushed = match self.session.as_mut() {
            Some(session) => {
                let drained = drain_to_end(session, output.as_mut(), &mut self.packets_written);
                session.flushed = true;
                drained
            }
            None => Ok(()),
        };
        // The trailer is written even when the drain failed so the file is released.
        let finished = output.write_trailer();

        flushed.map_err(|e| DeskrecError::OutputCloseError { reason: format!("flush: {e}") })?;
        finished.map_err(|e| DeskrecError::OutputCloseError { reason: format!("trailer: {e}") })?;

        if self.packets_written != self.frames_submitted {
            warn!(
                submitted = self.frames_submitted,
                written = self.packets_written,
                "[FrameEncoder] packet count differs from frames submitted"
            );
        }
        info!(
            frames = self.frames_submitted,
            packets = self.packets_written,
            "[FrameEncoder] output closed"
        );
        Ok(())
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    pub fn packets_written(&self) -> u64 {
        self.packets_written
    }

    pub fn is_output_open(&self) -> bool {
        self.output.is_some()
    }
}

impl Drop for FrameEncoder {
    fn drop(&mut self) {
        if self.output.is_some() {
            if let Err(e) = self.output_close() {
                warn!("[FrameEncoder] close on drop failed: {e}");
            }
        }
    }
}

/// Submit end of stream and move every remaining packet into `output`.
fn drain_to_end(session: &mut EncodeSession, output: &mut dyn Container, written: &mut u64) -> Result<()> {
    if !session.flushed {
        session.compressor.submit_eos()?;
    }
    let deadline = Instant::now() + FLUSH_TIMEOUT;
    loop {
        match session.compressor.receive_packet()? {
            PacketPoll::Ready(packet) => {
                output.write_packet(&packet)?;
                *written += 1;
            }
            PacketPoll::Drained => {
                debug!("[FrameEncoder] compressor drained");
                return Ok(());
            }
            PacketPoll::NotReady => {
                if Instant::now() >= deadline {
                    return Err(DeskrecError::EncodeDrainError {
                        reason: format!("compressor not drained after {FLUSH_TIMEOUT:?}"),
                    });
                }
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }
}

//! GStreamer H.264 compressor.
//!
//! Encoder priority (first factory found wins):
//! 1. `x264enc`     — software, `speed-preset=faster tune=zerolatency`
//! 2. `nvh264enc`   — NVIDIA NVENC
//! 3. `mfh264enc`   — Windows Media Foundation
//! 4. `openh264enc` — Cisco OpenH264 plugin
//!
//! Pipeline:
//! ```text
//! appsrc (I420, format=time)
//!   → <encoder>  (GOP = gop_size, no B-frames)
//!   → h264parse
//!   → video/x-h264,stream-format=byte-stream,alignment=au
//!   → appsink
//! ```

use anyhow::{Context, Result as AnyResult};
use deskrec_core::{DeskrecError, EncodedPacket, Result};
use gstreamer::{self as gst, prelude::*};
use gstreamer_app::{AppSink, AppSrc};
use tracing::{debug, info, warn};

use super::{Compressor, EncoderSettings, PacketPoll, VideoCodec};
use crate::convert::PlanarFrame;

/// How long a drain poll waits once end of stream has been sent.
const EOS_PULL_TIMEOUT_MS: u64 = 100;

// ── Encoder selection ─────────────────────────────────────────────────────────

const ENCODER_CANDIDATES: &[&str] = &["x264enc", "nvh264enc", "mfh264enc", "openh264enc"];

fn pick_encoder() -> Option<&'static str> {
    let found = ENCODER_CANDIDATES
        .iter()
        .copied()
        .find(|name| gst::ElementFactory::find(name).is_some());
    match found {
        Some(name) => info!("[GstCodec] Using encoder: {}", name),
        None => warn!("[GstCodec] No H.264 encoder element installed"),
    }
    found
}

fn encoder_fragment(name: &str, s: &EncoderSettings) -> String {
    let kbps = (s.bitrate_bps / 1000).max(1);
    let gop = s.gop_size.max(1);
    match name {
        "x264enc" => {
            let tune = if s.low_latency { " tune=zerolatency" } else { "" };
            format!(
                "x264enc bitrate={kbps} speed-preset=faster{tune} key-int-max={gop} bframes={}",
                s.max_b_frames
            )
        }
        "nvh264enc" => format!(
            "nvh264enc bitrate={kbps} gop-size={gop} bframes={} preset=low-latency-hq zerolatency=true",
            s.max_b_frames
        ),
        "mfh264enc" => format!(
            "mfh264enc bitrate={kbps} gop-size={gop} bframes={} low-latency={}",
            s.max_b_frames, s.low_latency
        ),
        _ => format!("openh264enc bitrate={} gop-size={gop}", s.bitrate_bps),
    }
}

// ── GstCodec ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct GstCodec;

impl GstCodec {
    pub fn new() -> Self {
        Self
    }
}

impl VideoCodec for GstCodec {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn Compressor>> {
        // appsrc assumes GStreamer's default I420 strides (rows padded to 4 bytes),
        // which match the packed planes only when the chroma width is a multiple of 4.
        if settings.width % 8 != 0 || settings.height % 2 != 0 {
            return Err(DeskrecError::InvalidDimensions {
                width:           settings.width,
                height:          settings.height,
                bytes_per_pixel: 4,
            });
        }
        let compressor = GstCompressor::new(settings).map_err(|e| DeskrecError::EncodeSubmitError {
            reason: format!("building GStreamer pipeline: {e:#}"),
        })?;
        Ok(Box::new(compressor))
    }
}

// ── GstCompressor ─────────────────────────────────────────────────────────────

struct GstCompressor {
    pipeline: gst::Pipeline,
    appsrc:   AppSrc,
    appsink:  AppSink,
    fps:      u32,
    eos:      bool,
}

impl GstCompressor {
    fn new(settings: &EncoderSettings) -> AnyResult<Self> {
        gst::init().context("gst::init")?;
        let encoder = pick_encoder().context("no H.264 encoder element available")?;

        let (width, height, fps) = (settings.width, settings.height, settings.fps);
        let pipeline_desc = format!(
            "appsrc name=src format=time block=true \
             caps=video/x-raw,format=I420,width={width},height={height},framerate={fps}/1 \
             ! {} \
             ! h264parse config-interval=-1 \
             ! video/x-h264,stream-format=byte-stream,alignment=au \
             ! appsink name=sink sync=false",
            encoder_fragment(encoder, settings)
        );
        debug!("[GstCodec] Pipeline: {}", pipeline_desc);

        let pipeline = gst::parse::launch(&pipeline_desc)
            .context("GStreamer pipeline parse")?
            .downcast::<gst::Pipeline>()
            .map_err(|_| anyhow::anyhow!("Pipeline downcast failed"))?;

        let appsrc = pipeline
            .by_name("src")
            .context("src element")?
            .downcast::<AppSrc>()
            .map_err(|_| anyhow::anyhow!("AppSrc downcast"))?;

        let appsink = pipeline
            .by_name("sink")
            .context("sink element")?
            .downcast::<AppSink>()
            .map_err(|_| anyhow::anyhow!("AppSink downcast"))?;

        pipeline.set_state(gst::State::Playing).context("Pipeline → Playing")?;
        info!(
            "[GstCodec] Pipeline running: {}×{} @{}fps {}bps ({})",
            width, height, fps, settings.bitrate_bps, encoder
        );

        Ok(Self { pipeline, appsrc, appsink, fps: fps.max(1), eos: false })
    }

    fn frame_time(&self, pts: i64) -> gst::ClockTime {
        gst::ClockTime::from_nseconds(pts.max(0) as u64 * 1_000_000_000 / self.fps as u64)
    }

    /// Surface the first error posted on the pipeline bus, if any.
    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!(
                "{} ({})",
                err.error(),
                err.debug().map(|d| d.to_string()).unwrap_or_default()
            )),
            _ => None,
        }
    }
}

impl Compressor for GstCompressor {
    fn submit(&mut self, frame: &PlanarFrame, pts: i64) -> Result<()> {
        if self.eos {
            return Err(DeskrecError::EncodeSubmitError { reason: "end of stream already submitted".into() });
        }

        let mut buffer = gst::Buffer::from_mut_slice(frame.as_bytes().to_vec());
        let duration = self.frame_time(1);
        let time = self.frame_time(pts);
        if let Some(buf) = buffer.get_mut() {
            buf.set_pts(time);
            buf.set_duration(duration);
        }
        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| DeskrecError::EncodeSubmitError { reason: format!("push_buffer: {e}") })?;
        Ok(())
    }

    fn submit_eos(&mut self) -> Result<()> {
        if !self.eos {
            self.eos = true;
            self.appsrc
                .end_of_stream()
                .map_err(|e| DeskrecError::EncodeSubmitError { reason: format!("end_of_stream: {e}") })?;
        }
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<PacketPoll> {
        if let Some(reason) = self.bus_error() {
            return Err(DeskrecError::EncodeDrainError { reason });
        }

        let timeout = if self.eos {
            gst::ClockTime::from_mseconds(EOS_PULL_TIMEOUT_MS)
        } else {
            gst::ClockTime::ZERO
        };
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.eos && self.appsink.is_eos() {
                return Ok(PacketPoll::Drained);
            }
            return Ok(PacketPoll::NotReady);
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| DeskrecError::EncodeDrainError { reason: "sample without buffer".into() })?;
        let map = buffer
            .map_readable()
            .map_err(|e| DeskrecError::EncodeDrainError { reason: format!("buffer map: {e}") })?;
        let is_keyframe = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);
        let pts = buffer
            .pts()
            .map(|t| ((t.nseconds() * self.fps as u64 + 500_000_000) / 1_000_000_000) as i64)
            .unwrap_or(0);

        Ok(PacketPoll::Ready(EncodedPacket { data: map.as_slice().to_vec(), pts, is_keyframe }))
    }
}

impl Drop for GstCompressor {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn x264_fragment_carries_gop_and_zero_latency() {
        let s = EncoderSettings::new(800, 600, 30, 4_000_000, 30);
        let frag = encoder_fragment("x264enc", &s);
        assert!(frag.contains("bitrate=4000"));
        assert!(frag.contains("key-int-max=30"));
        assert!(frag.contains("bframes=0"));
        assert!(frag.contains("tune=zerolatency"));
    }

    #[test]
    fn unaligned_width_is_rejected_before_pipeline_build() {
        let s = EncoderSettings::new(802, 600, 30, 4_000_000, 30);
        assert!(matches!(
            GstCodec::new().open(&s).err(),
            Some(DeskrecError::InvalidDimensions { .. })
        ));
    }
}

//! Video compressor interface and the built-in H.264 backends.
//!
//! | Name        | Feature     | Implementation                              |
//! |-------------|-------------|---------------------------------------------|
//! | `openh264`  | `openh264`  | Cisco OpenH264, in-process (default)        |
//! | `gstreamer` | `gstreamer` | `appsrc → x264enc/nvh264enc/... → appsink`  |

use std::sync::Arc;

use deskrec_core::{DeskrecError, EncodedPacket, Result};

use crate::convert::PlanarFrame;

#[cfg(feature = "gstreamer")]
mod gst;
#[cfg(feature = "openh264")]
mod openh264_enc;

#[cfg(feature = "gstreamer")]
pub use gst::GstCodec;
#[cfg(feature = "openh264")]
pub use openh264_enc::OpenH264Codec;

/// Codec used when none is named.
#[cfg(feature = "openh264")]
pub const DEFAULT_CODEC: &str = "openh264";
#[cfg(not(feature = "openh264"))]
pub const DEFAULT_CODEC: &str = "gstreamer";

// ── Settings ──────────────────────────────────────────────────────────────────

/// Compressor session parameters, fixed for the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSettings {
    pub width:        u32,
    pub height:       u32,
    pub fps:          u32,
    pub bitrate_bps:  u32,
    /// Frames between keyframes.
    pub gop_size:     u32,
    /// Always 0: every frame is emitted in submission order.
    pub max_b_frames: u32,
    /// Favor latency over compression (no look-ahead, zero-latency tuning).
    pub low_latency:  bool,
}

impl EncoderSettings {
    pub fn new(width: u32, height: u32, fps: u32, bitrate_bps: u32, gop_size: u32) -> Self {
        Self {
            width,
            height,
            fps,
            bitrate_bps,
            gop_size,
            max_b_frames: 0,
            low_latency: true,
        }
    }
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// Result of polling a compressor for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketPoll {
    Ready(EncodedPacket),
    /// Nothing buffered right now; submit more input.
    NotReady,
    /// End of stream was submitted and every packet has been handed out.
    Drained,
}

/// A compressor factory.
pub trait VideoCodec: Send + Sync {
    fn name(&self) -> &'static str;

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn Compressor>>;
}

/// An open compressor session.
///
/// Implementations reject `submit` after `submit_eos` with
/// [`DeskrecError::EncodeSubmitError`] and report drain failures other than
/// "not ready" as [`DeskrecError::EncodeDrainError`].
pub trait Compressor: Send {
    fn submit(&mut self, frame: &PlanarFrame, pts: i64) -> Result<()>;

    /// Signal end of stream. Buffered frames are still handed out by
    /// [`Compressor::receive_packet`] until it reports [`PacketPoll::Drained`].
    fn submit_eos(&mut self) -> Result<()>;

    fn receive_packet(&mut self) -> Result<PacketPoll>;
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Names of the codecs compiled into this build.
pub fn available() -> Vec<&'static str> {
    let mut names = Vec::new();
    #[cfg(feature = "openh264")]
    names.push("openh264");
    #[cfg(feature = "gstreamer")]
    names.push("gstreamer");
    names
}

pub fn by_name(name: &str) -> Result<Arc<dyn VideoCodec>> {
    match name.to_ascii_lowercase().as_str() {
        #[cfg(feature = "openh264")]
        "openh264" => Ok(Arc::new(OpenH264Codec)),
        #[cfg(feature = "gstreamer")]
        "gstreamer" | "gst" => Ok(Arc::new(GstCodec::new())),
        _ => Err(DeskrecError::ConfigurationInvalid {
            reason: format!("unknown codec {name:?} (available: {})", available().join(", ")),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_disable_b_frames() {
        let s = EncoderSettings::new(800, 600, 30, 4_000_000, 30);
        assert_eq!(s.max_b_frames, 0);
        assert!(s.low_latency);
    }

    #[test]
    fn unknown_codec_is_a_configuration_error() {
        let err = by_name("vp9").err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn default_codec_is_registered() {
        assert!(available().contains(&DEFAULT_CODEC));
        assert_eq!(by_name(DEFAULT_CODEC).unwrap().name(), DEFAULT_CODEC);
    }
}

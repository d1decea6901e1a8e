//! deskrec-recorder — capture → convert → encode → file.
//!
//! ```text
//! FrameSource (capture thread, 2× rate)
//!   │  FrameBuffer (latest wins)
//!   ▼
//! Recorder pacing thread (1 / (fps + 5) s)
//!   │  FrameEncoder: BGRA → I420 → Compressor
//!   ▼
//! Container (Annex B .h264)
//! ```

pub mod codec;
pub mod container;
pub mod convert;
pub mod encoder;
pub mod pacing;
pub mod recorder;

pub use codec::{Compressor, EncoderSettings, PacketPoll, VideoCodec};
pub use container::{Container, ContainerFormat};
pub use convert::PlanarFrame;
pub use encoder::FrameEncoder;
pub use pacing::{Pacer, PacingStats};
pub use recorder::{EndReason, Recorder, RecorderEvent, RecordingStats};

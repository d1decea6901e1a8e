//! In-process H.264 via Cisco OpenH264.
//!
//! OpenH264 encodes synchronously: every submitted frame yields exactly one
//! access unit before `submit` returns, so end of stream has nothing left to
//! flush. Rate-control frame skipping is disabled; an empty bitstream is an
//! error rather than a dropped frame. The baseline profile it produces never
//! contains B-frames.

use std::collections::VecDeque;

use deskrec_core::{DeskrecError, EncodedPacket, Result};
use openh264::encoder::{BitRate, Encoder, EncoderConfig, FrameRate, FrameType, RateControlMode};
use openh264::formats::YUVSlices;
use openh264::OpenH264API;
use tracing::{debug, info};

use super::{Compressor, EncoderSettings, PacketPoll, VideoCodec};
use crate::convert::PlanarFrame;

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenH264Codec;

impl VideoCodec for OpenH264Codec {
    fn name(&self) -> &'static str {
        "openh264"
    }

    fn open(&self, settings: &EncoderSettings) -> Result<Box<dyn Compressor>> {
        let config = EncoderConfig::new()
            .bitrate(BitRate::from_bps(settings.bitrate_bps))
            .max_frame_rate(FrameRate::from_hz(settings.fps as f32))
            .rate_control_mode(RateControlMode::Bitrate)
            .skip_frames(false);

        let api = OpenH264API::from_source();
        let encoder = Encoder::with_api_config(api, config).map_err(|e| DeskrecError::EncodeSubmitError {
            reason: format!("creating OpenH264 encoder: {e}"),
        })?;

        info!(
            width = settings.width,
            height = settings.height,
            fps = settings.fps,
            bitrate = settings.bitrate_bps,
            gop = settings.gop_size,
            "[OpenH264] encoder created"
        );

        Ok(Box::new(OpenH264Compressor {
            encoder,
            settings: settings.clone(),
            pending: VecDeque::new(),
            submitted: 0,
            eos: false,
        }))
    }
}

struct OpenH264Compressor {
    encoder:   Encoder,
    settings:  EncoderSettings,
    pending:   VecDeque<EncodedPacket>,
    submitted: u64,
    eos:       bool,
}

// SAFETY: the encoder handle is owned by exactly one compressor and only used
// through `&mut self`, so moving it to the pacing thread is sound.
unsafe impl Send for OpenH264Compressor {}

impl Compressor for OpenH264Compressor {
    fn submit(&mut self, frame: &PlanarFrame, pts: i64) -> Result<()> {
        if self.eos {
            return Err(DeskrecError::EncodeSubmitError { reason: "end of stream already submitted".into() });
        }
        if frame.width() != self.settings.width || frame.height() != self.settings.height {
            return Err(DeskrecError::EncodeSubmitError {
                reason: format!(
                    "frame {}x{} does not match encoder {}x{}",
                    frame.width(),
                    frame.height(),
                    self.settings.width,
                    self.settings.height
                ),
            });
        }

        // GOP boundary.
        if self.submitted > 0 && self.submitted % self.settings.gop_size.max(1) as u64 == 0 {
            self.encoder.force_intra_frame();
        }

        let w = frame.width() as usize;
        let h = frame.height() as usize;
        let cw = frame.chroma_width();
        let yuv = YUVSlices::new((frame.y(), frame.u(), frame.v()), (w, h), (w, cw, cw));

        let bitstream = self.encoder.encode(&yuv).map_err(|e| DeskrecError::EncodeSubmitError {
            reason: format!("OpenH264 encode: {e}"),
        })?;
        let is_keyframe = matches!(bitstream.frame_type(), FrameType::IDR | FrameType::I);
        let data = bitstream.to_vec();

        if data.is_empty() {
            return Err(DeskrecError::EncodeDrainError {
                reason: format!("OpenH264 produced no bitstream for frame {pts}"),
            });
        }
        debug!(pts, bytes = data.len(), is_keyframe, "[OpenH264] frame encoded");
        self.pending.push_back(EncodedPacket { data, pts, is_keyframe });
        self.submitted += 1;
        Ok(())
    }

    fn submit_eos(&mut self) -> Result<()> {
        self.eos = true;
        Ok(())
    }

    fn receive_packet(&mut self) -> Result<PacketPoll> {
        match self.pending.pop_front() {
            Some(packet) => Ok(PacketPoll::Ready(packet)),
            None if self.eos => Ok(PacketPoll::Drained),
            None => Ok(PacketPoll::NotReady),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::bgra_to_i420;

    fn gray_frame(w: u32, h: u32, level: u8) -> PlanarFrame {
        let src: Vec<u8> = [level, level, level, 255].repeat((w * h) as usize);
        let mut frame = PlanarFrame::new(w, h);
        bgra_to_i420(&src, 4, &mut frame).unwrap();
        frame
    }

    #[test]
    fn one_packet_per_frame_and_first_is_keyframe() {
        let settings = EncoderSettings::new(160, 120, 30, 500_000, 30);
        let mut compressor = OpenH264Codec.open(&settings).unwrap();
        let frame = gray_frame(160, 120, 90);

        for pts in 0..3 {
            compressor.submit(&frame, pts).unwrap();
            match compressor.receive_packet().unwrap() {
                PacketPoll::Ready(packet) => {
                    assert_eq!(packet.pts, pts);
                    if pts == 0 {
                        assert!(packet.is_keyframe);
                        assert_eq!(&packet.data[..4], &[0, 0, 0, 1], "Annex B start code");
                    }
                }
                other => panic!("expected a packet, got {other:?}"),
            }
            assert_eq!(compressor.receive_packet().unwrap(), PacketPoll::NotReady);
        }
    }

    #[test]
    fn noisy_frames_at_low_bitrate_are_never_skipped() {
        let (w, h) = (320u32, 240u32);
        let settings = EncoderSettings::new(w, h, 30, 100_000, 30);
        let mut compressor = OpenH264Codec.open(&settings).unwrap();
        let mut frame = PlanarFrame::new(w, h);

        // xorshift noise defeats prediction, so rate control is under pressure.
        let mut state = 0x2545_f491_u32;
        let mut src = vec![0u8; (w * h * 4) as usize];
        for pts in 0..60 {
            for b in src.iter_mut() {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                *b = state as u8;
            }
            bgra_to_i420(&src, 4, &mut frame).unwrap();
            compressor.submit(&frame, pts).unwrap();
            match compressor.receive_packet().unwrap() {
                PacketPoll::Ready(packet) => {
                    assert_eq!(packet.pts, pts);
                    assert!(!packet.data.is_empty(), "frame {pts} was skipped");
                }
                other => panic!("expected a packet for frame {pts}, got {other:?}"),
            }
        }
    }

    #[test]
    fn gop_boundary_forces_keyframe() {
        let settings = EncoderSettings::new(160, 120, 30, 500_000, 4);
        let mut compressor = OpenH264Codec.open(&settings).unwrap();
        let frame = gray_frame(160, 120, 40);

        let mut keyframes = Vec::new();
        for pts in 0..9 {
            compressor.submit(&frame, pts).unwrap();
            if let PacketPoll::Ready(packet) = compressor.receive_packet().unwrap() {
                if packet.is_keyframe {
                    keyframes.push(packet.pts);
                }
            }
        }
        assert!(keyframes.contains(&0));
        assert!(keyframes.contains(&4));
        assert!(keyframes.contains(&8));
    }

    #[test]
    fn submit_after_eos_is_rejected_and_drain_completes() {
        let settings = EncoderSettings::new(64, 64, 30, 200_000, 30);
        let mut compressor = OpenH264Codec.open(&settings).unwrap();
        let frame = gray_frame(64, 64, 200);

        compressor.submit(&frame, 0).unwrap();
        compressor.submit_eos().unwrap();
        assert!(matches!(compressor.receive_packet().unwrap(), PacketPoll::Ready(_)));
        assert_eq!(compressor.receive_packet().unwrap(), PacketPoll::Drained);
        assert!(matches!(
            compressor.submit(&frame, 1),
            Err(DeskrecError::EncodeSubmitError { .. })
        ));
    }
}

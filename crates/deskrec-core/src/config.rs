use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{DeskrecError, Result};

/// Default display surface, the first output of the primary adapter.
pub const DEFAULT_SURFACE: &str = r"\\.\DISPLAY1";

/// Recording session configuration, supplied once at `start()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Device name of the display output to capture.
    #[serde(alias = "targetDisplay")]
    pub surface: String,
    #[serde(alias = "targetFPS")]
    pub target_fps: u32,
    #[serde(alias = "bitrateBps")]
    pub bitrate_bps: u32,
    pub output: PathBuf,
    /// Frames between forced keyframes.
    #[serde(alias = "gopSize")]
    pub gop_size: u32,
    /// Capture runs at `target_fps * capture_rate_multiplier` so the encoder
    /// never sees a frame older than half a frame interval.
    #[serde(alias = "captureRateMultiplier")]
    pub capture_rate_multiplier: u32,
    /// Added to `target_fps` when computing the pacing interval, absorbing
    /// scheduler jitter so the achieved rate does not undershoot.
    #[serde(alias = "pacingHeadroomFps")]
    pub pacing_headroom_fps: u32,
    /// Longest wait for a single captured frame before capture ends.
    /// `None` waits indefinitely.
    #[serde(alias = "acquireTimeoutMs")]
    pub acquire_timeout_ms: Option<u64>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            surface: DEFAULT_SURFACE.to_owned(),
            target_fps: 30,
            bitrate_bps: 4_000_000,
            output: PathBuf::from("output.h264"),
            gop_size: 30,
            capture_rate_multiplier: 2,
            pacing_headroom_fps: 5,
            acquire_timeout_ms: None,
        }
    }
}

impl RecordingConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| DeskrecError::ConfigurationInvalid {
            reason: format!("{}: {e}", path.display()),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.target_fps == 0 {
            return Err(DeskrecError::InvalidRate { rate: self.target_fps });
        }
        if self.bitrate_bps == 0 {
            return Err(DeskrecError::InvalidBitrate { bitrate: self.bitrate_bps });
        }
        if self.surface.is_empty() {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: "surface must not be empty".into(),
            });
        }
        if self.gop_size == 0 {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: "gop_size must be at least 1".into(),
            });
        }
        if self.capture_rate_multiplier == 0 {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: "capture_rate_multiplier must be at least 1".into(),
            });
        }
        if self.output.as_os_str().is_empty() {
            return Err(DeskrecError::ConfigurationInvalid {
                reason: "output path must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Nominal interval between encoded frames in microseconds.
    pub fn frame_interval_us(&self) -> u64 {
        1_000_000 / self.target_fps.max(1) as u64
    }

    /// Interval between capture iterations in microseconds.
    pub fn capture_interval_us(&self) -> u64 {
        capture_interval_us(self.target_fps, self.capture_rate_multiplier)
    }

    /// Interval between pacing iterations in microseconds.
    pub fn pacing_interval_us(&self) -> u64 {
        pacing_interval_us(self.target_fps, self.pacing_headroom_fps)
    }
}

/// `1_000_000 / (multiplier * rate)`, saturating at one iteration per second.
pub fn capture_interval_us(target_fps: u32, multiplier: u32) -> u64 {
    let rate = target_fps as u64 * multiplier.max(1) as u64;
    1_000_000 / rate.max(1)
}

/// `1_000_000 / (rate + headroom)`.
pub fn pacing_interval_us(target_fps: u32, headroom_fps: u32) -> u64 {
    let rate = target_fps as u64 + headroom_fps as u64;
    1_000_000 / rate.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_camel_case_fields() {
        let json = r#"{
            "targetDisplay": "\\\\.\\DISPLAY2",
            "targetFPS": 60,
            "bitrateBps": 8000000,
            "gopSize": 60
        }"#;

        let cfg: RecordingConfig = serde_json::from_str(json).expect("valid camelCase config");
        assert_eq!(cfg.surface, r"\\.\DISPLAY2");
        assert_eq!(cfg.target_fps, 60);
        assert_eq!(cfg.bitrate_bps, 8_000_000);
        assert_eq!(cfg.gop_size, 60);
        assert_eq!(cfg.capture_rate_multiplier, 2);
    }

    #[test]
    fn deserializes_snake_case_fields() {
        let json = r#"{
            "target_fps": 25,
            "output": "capture.h264",
            "acquire_timeout_ms": 2000
        }"#;

        let cfg: RecordingConfig = serde_json::from_str(json).expect("valid snake_case config");
        assert_eq!(cfg.target_fps, 25);
        assert_eq!(cfg.output, PathBuf::from("capture.h264"));
        assert_eq!(cfg.acquire_timeout_ms, Some(2000));
        assert_eq!(cfg.surface, DEFAULT_SURFACE);
    }

    #[test]
    fn intervals_use_named_multipliers() {
        let cfg = RecordingConfig::default();
        assert_eq!(cfg.frame_interval_us(), 33_333);
        assert_eq!(cfg.capture_interval_us(), 16_666);
        assert_eq!(cfg.pacing_interval_us(), 28_571);
    }

    #[test]
    fn validate_rejects_zero_rate_and_bitrate() {
        let cfg = RecordingConfig { target_fps: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(DeskrecError::InvalidRate { rate: 0 })));

        let cfg = RecordingConfig { bitrate_bps: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(DeskrecError::InvalidBitrate { bitrate: 0 })));

        let cfg = RecordingConfig { gop_size: 0, ..Default::default() };
        assert!(cfg.validate().unwrap_err().is_configuration());

        RecordingConfig::default().validate().unwrap();
    }
}

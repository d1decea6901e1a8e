use serde::{Deserialize, Serialize};

use crate::errors::{DeskrecError, Result};
use crate::format::PixelFormat;

// MARK: - Rotation

/// Scan-out rotation reported by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rotation {
    Unspecified,
    Identity,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    /// Map a `DXGI_MODE_ROTATION` value.
    pub fn from_dxgi(value: i32) -> Self {
        match value {
            1 => Self::Identity,
            2 => Self::Rotate90,
            3 => Self::Rotate180,
            4 => Self::Rotate270,
            _ => Self::Unspecified,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unspecified => "DXGI_MODE_ROTATION_UNSPECIFIED",
            Self::Identity => "DXGI_MODE_ROTATION_IDENTITY",
            Self::Rotate90 => "DXGI_MODE_ROTATION_ROTATE90",
            Self::Rotate180 => "DXGI_MODE_ROTATION_ROTATE180",
            Self::Rotate270 => "DXGI_MODE_ROTATION_ROTATE270",
        }
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// MARK: - SurfaceDescriptor

/// Geometry and format of a bound display surface.
///
/// Produced once when a capture device is opened and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceDescriptor {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
}

impl SurfaceDescriptor {
    /// Build a descriptor whose bytes-per-pixel is derived from `format`.
    pub fn new(width: u32, height: u32, format: PixelFormat, rotation: Rotation) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel: format.bytes_per_pixel(),
            format,
            rotation,
        }
    }

    /// Bytes in one tightly packed row (no padding).
    pub fn row_bytes(&self) -> usize {
        self.width as usize * self.bytes_per_pixel as usize
    }

    /// Exact length of a raw frame for this surface.
    pub fn frame_len(&self) -> usize {
        self.row_bytes() * self.height as usize
    }

    /// Reject descriptors that cannot back a capture loop.
    pub fn validate(&self) -> Result<()> {
        if self.frame_len() == 0 {
            return Err(DeskrecError::InvalidDimensions {
                width: self.width,
                height: self.height,
                bytes_per_pixel: self.bytes_per_pixel,
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for SurfaceDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}×{} {}B/px {} {}",
            self.width, self.height, self.bytes_per_pixel, self.format, self.rotation
        )
    }
}

// MARK: - EncodedPacket

/// One unit of compressed bitstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    /// Presentation timestamp in frame units (per-session frame counter).
    pub pts: i64,
    pub is_keyframe: bool,
}

// MARK: - SessionState

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

impl SessionState {
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_len_is_exact_product() {
        for (w, h, fmt) in [
            (1u32, 1u32, PixelFormat::B8G8R8A8_UNORM),
            (800, 600, PixelFormat::B8G8R8A8_UNORM),
            (7, 3, PixelFormat::R16_UNORM),
            (1920, 1080, PixelFormat::R16G16B16A16_FLOAT),
        ] {
            let desc = SurfaceDescriptor::new(w, h, fmt, Rotation::Identity);
            assert_eq!(
                desc.frame_len(),
                w as usize * h as usize * fmt.bytes_per_pixel() as usize
            );
            desc.validate().unwrap();
        }
    }

    #[test]
    fn zero_sized_descriptor_is_rejected() {
        let desc = SurfaceDescriptor::new(0, 600, PixelFormat::B8G8R8A8_UNORM, Rotation::Identity);
        assert!(matches!(desc.validate(), Err(DeskrecError::InvalidDimensions { .. })));

        let unknown = SurfaceDescriptor::new(800, 600, PixelFormat(0), Rotation::Identity);
        assert!(unknown.validate().is_err());
    }

    #[test]
    fn rotation_maps_dxgi_values() {
        assert_eq!(Rotation::from_dxgi(1), Rotation::Identity);
        assert_eq!(Rotation::from_dxgi(4), Rotation::Rotate270);
        assert_eq!(Rotation::from_dxgi(99), Rotation::Unspecified);
    }

    #[test]
    fn only_idle_is_inactive() {
        assert!(!SessionState::Idle.is_active());
        for state in [SessionState::Starting, SessionState::Running, SessionState::Stopping] {
            assert!(state.is_active(), "{state}");
        }
    }
}

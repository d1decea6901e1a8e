//! Surface pixel formats, keyed by their `DXGI_FORMAT` value.
//!
//! Only the byte size and the channel order matter to the recorder; the
//! names exist for logging what the capture device reports.

use serde::{Deserialize, Serialize};

/// A `DXGI_FORMAT` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelFormat(pub u32);

impl PixelFormat {
    pub const UNKNOWN: Self = Self(0);
    pub const R32G32B32A32_TYPELESS: Self = Self(1);
    pub const R32G32B32A32_FLOAT: Self = Self(2);
    pub const R32G32B32A32_UINT: Self = Self(3);
    pub const R32G32B32A32_SINT: Self = Self(4);
    pub const R32G32B32_TYPELESS: Self = Self(5);
    pub const R32G32B32_FLOAT: Self = Self(6);
    pub const R32G32B32_UINT: Self = Self(7);
    pub const R32G32B32_SINT: Self = Self(8);
    pub const R16G16B16A16_TYPELESS: Self = Self(9);
    pub const R16G16B16A16_FLOAT: Self = Self(10);
    pub const R16G16B16A16_UNORM: Self = Self(11);
    pub const R16G16B16A16_UINT: Self = Self(12);
    pub const R16G16B16A16_SNORM: Self = Self(13);
    pub const R16G16B16A16_SINT: Self = Self(14);
    pub const R32G32_TYPELESS: Self = Self(15);
    pub const R32G32_FLOAT: Self = Self(16);
    pub const R32G32_UINT: Self = Self(17);
    pub const R32G32_SINT: Self = Self(18);
    pub const R32G8X24_TYPELESS: Self = Self(19);
    pub const D32_FLOAT_S8X24_UINT: Self = Self(20);
    pub const R32_FLOAT_X8X24_TYPELESS: Self = Self(21);
    pub const X32_TYPELESS_G8X24_UINT: Self = Self(22);
    pub const R10G10B10A2_TYPELESS: Self = Self(23);
    pub const R10G10B10A2_UNORM: Self = Self(24);
    pub const R10G10B10A2_UINT: Self = Self(25);
    pub const R11G11B10_FLOAT: Self = Self(26);
    pub const R8G8B8A8_TYPELESS: Self = Self(27);
    pub const R8G8B8A8_UNORM: Self = Self(28);
    pub const R8G8B8A8_UNORM_SRGB: Self = Self(29);
    pub const R8G8B8A8_UINT: Self = Self(30);
    pub const R8G8B8A8_SNORM: Self = Self(31);
    pub const R8G8B8A8_SINT: Self = Self(32);
    pub const R16G16_TYPELESS: Self = Self(33);
    pub const R16G16_FLOAT: Self = Self(34);
    pub const R16G16_UNORM: Self = Self(35);
    pub const R16G16_UINT: Self = Self(36);
    pub const R16G16_SNORM: Self = Self(37);
    pub const R16G16_SINT: Self = Self(38);
    pub const R32_TYPELESS: Self = Self(39);
    pub const D32_FLOAT: Self = Self(40);
    pub const R32_FLOAT: Self = Self(41);
    pub const R32_UINT: Self = Self(42);
    pub const R32_SINT: Self = Self(43);
    pub const R24G8_TYPELESS: Self = Self(44);
    pub const D24_UNORM_S8_UINT: Self = Self(45);
    pub const R24_UNORM_X8_TYPELESS: Self = Self(46);
    pub const X24_TYPELESS_G8_UINT: Self = Self(47);
    pub const R8G8_TYPELESS: Self = Self(48);
    pub const R8G8_UNORM: Self = Self(49);
    pub const R8G8_UINT: Self = Self(50);
    pub const R8G8_SNORM: Self = Self(51);
    pub const R8G8_SINT: Self = Self(52);
    pub const R16_TYPELESS: Self = Self(53);
    pub const R16_FLOAT: Self = Self(54);
    pub const D16_UNORM: Self = Self(55);
    pub const R16_UNORM: Self = Self(56);
    pub const R16_UINT: Self = Self(57);
    pub const R16_SNORM: Self = Self(58);
    pub const R16_SINT: Self = Self(59);
    pub const R8_TYPELESS: Self = Self(60);
    pub const R8_UNORM: Self = Self(61);
    pub const R8_UINT: Self = Self(62);
    pub const R8_SNORM: Self = Self(63);
    pub const R8_SINT: Self = Self(64);
    pub const A8_UNORM: Self = Self(65);
    pub const R1_UNORM: Self = Self(66);
    pub const R9G9B9E5_SHAREDEXP: Self = Self(67);
    pub const R8G8_B8G8_UNORM: Self = Self(68);
    pub const G8R8_G8B8_UNORM: Self = Self(69);
    pub const B5G6R5_UNORM: Self = Self(85);
    pub const B5G5R5A1_UNORM: Self = Self(86);
    pub const B8G8R8A8_UNORM: Self = Self(87);
    pub const B8G8R8X8_UNORM: Self = Self(88);
    pub const R10G10B10_XR_BIAS_A2_UNORM: Self = Self(89);
    pub const B8G8R8A8_TYPELESS: Self = Self(90);
    pub const B8G8R8A8_UNORM_SRGB: Self = Self(91);
    pub const B8G8R8X8_TYPELESS: Self = Self(92);
    pub const B8G8R8X8_UNORM_SRGB: Self = Self(93);
    pub const AYUV: Self = Self(100);
    pub const Y410: Self = Self(101);
    pub const Y416: Self = Self(102);
    pub const NV12: Self = Self(103);
    pub const P010: Self = Self(104);
    pub const P016: Self = Self(105);
    pub const OPAQUE_420: Self = Self(106);
    pub const YUY2: Self = Self(107);
    pub const Y210: Self = Self(108);
    pub const Y216: Self = Self(109);
    pub const NV11: Self = Self(110);
    pub const AI44: Self = Self(111);
    pub const IA44: Self = Self(112);
    pub const P8: Self = Self(113);
    pub const A8P8: Self = Self(114);
    pub const B4G4R4A4_UNORM: Self = Self(115);

    /// Whole bytes per pixel, or 0 for block-compressed, sub-byte and
    /// planar formats that have no packed per-pixel size.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.0 {
            1..=4 => 16,
            5..=8 => 12,
            9..=22 | 102 | 108 | 109 => 8,
            23..=47 | 67..=69 | 87..=93 | 100 | 101 | 104 | 105 | 107 => 4,
            48..=59 | 85 | 86 | 114 | 115 => 2,
            60..=65 | 111..=113 => 1,
            _ => 0,
        }
    }

    /// True when the first three bytes of each pixel are blue, green, red.
    pub fn is_bgr_order(&self) -> bool {
        matches!(self.0, 87 | 88 | 90..=93)
    }

    pub fn name(&self) -> &'static str {
        match *self {
            Self::R32G32B32A32_TYPELESS => "DXGI_FORMAT_R32G32B32A32_TYPELESS",
            Self::R32G32B32A32_FLOAT => "DXGI_FORMAT_R32G32B32A32_FLOAT",
            Self::R32G32B32A32_UINT => "DXGI_FORMAT_R32G32B32A32_UINT",
            Self::R32G32B32A32_SINT => "DXGI_FORMAT_R32G32B32A32_SINT",
            Self::R32G32B32_TYPELESS => "DXGI_FORMAT_R32G32B32_TYPELESS",
            Self::R32G32B32_FLOAT => "DXGI_FORMAT_R32G32B32_FLOAT",
            Self::R32G32B32_UINT => "DXGI_FORMAT_R32G32B32_UINT",
            Self::R32G32B32_SINT => "DXGI_FORMAT_R32G32B32_SINT",
            Self::R16G16B16A16_TYPELESS => "DXGI_FORMAT_R16G16B16A16_TYPELESS",
            Self::R16G16B16A16_FLOAT => "DXGI_FORMAT_R16G16B16A16_FLOAT",
            Self::R16G16B16A16_UNORM => "DXGI_FORMAT_R16G16B16A16_UNORM",
            Self::R16G16B16A16_UINT => "DXGI_FORMAT_R16G16B16A16_UINT",
            Self::R16G16B16A16_SNORM => "DXGI_FORMAT_R16G16B16A16_SNORM",
            Self::R16G16B16A16_SINT => "DXGI_FORMAT_R16G16B16A16_SINT",
            Self::R32G32_TYPELESS => "DXGI_FORMAT_R32G32_TYPELESS",
            Self::R32G32_FLOAT => "DXGI_FORMAT_R32G32_FLOAT",
            Self::R32G32_UINT => "DXGI_FORMAT_R32G32_UINT",
            Self::R32G32_SINT => "DXGI_FORMAT_R32G32_SINT",
            Self::R32G8X24_TYPELESS => "DXGI_FORMAT_R32G8X24_TYPELESS",
            Self::D32_FLOAT_S8X24_UINT => "DXGI_FORMAT_D32_FLOAT_S8X24_UINT",
            Self::R32_FLOAT_X8X24_TYPELESS => "DXGI_FORMAT_R32_FLOAT_X8X24_TYPELESS",
            Self::X32_TYPELESS_G8X24_UINT => "DXGI_FORMAT_X32_TYPELESS_G8X24_UINT",
            Self::R10G10B10A2_TYPELESS => "DXGI_FORMAT_R10G10B10A2_TYPELESS",
            Self::R10G10B10A2_UNORM => "DXGI_FORMAT_R10G10B10A2_UNORM",
            Self::R10G10B10A2_UINT => "DXGI_FORMAT_R10G10B10A2_UINT",
            Self::R11G11B10_FLOAT => "DXGI_FORMAT_R11G11B10_FLOAT",
            Self::R8G8B8A8_TYPELESS => "DXGI_FORMAT_R8G8B8A8_TYPELESS",
            Self::R8G8B8A8_UNORM => "DXGI_FORMAT_R8G8B8A8_UNORM",
            Self::R8G8B8A8_UNORM_SRGB => "DXGI_FORMAT_R8G8B8A8_UNORM_SRGB",
            Self::R8G8B8A8_UINT => "DXGI_FORMAT_R8G8B8A8_UINT",
            Self::R8G8B8A8_SNORM => "DXGI_FORMAT_R8G8B8A8_SNORM",
            Self::R8G8B8A8_SINT => "DXGI_FORMAT_R8G8B8A8_SINT",
            Self::R16G16_TYPELESS => "DXGI_FORMAT_R16G16_TYPELESS",
            Self::R16G16_FLOAT => "DXGI_FORMAT_R16G16_FLOAT",
            Self::R16G16_UNORM => "DXGI_FORMAT_R16G16_UNORM",
            Self::R16G16_UINT => "DXGI_FORMAT_R16G16_UINT",
            Self::R16G16_SNORM => "DXGI_FORMAT_R16G16_SNORM",
            Self::R16G16_SINT => "DXGI_FORMAT_R16G16_SINT",
            Self::R32_TYPELESS => "DXGI_FORMAT_R32_TYPELESS",
            Self::D32_FLOAT => "DXGI_FORMAT_D32_FLOAT",
            Self::R32_FLOAT => "DXGI_FORMAT_R32_FLOAT",
            Self::R32_UINT => "DXGI_FORMAT_R32_UINT",
            Self::R32_SINT => "DXGI_FORMAT_R32_SINT",
            Self::R24G8_TYPELESS => "DXGI_FORMAT_R24G8_TYPELESS",
            Self::D24_UNORM_S8_UINT => "DXGI_FORMAT_D24_UNORM_S8_UINT",
            Self::R24_UNORM_X8_TYPELESS => "DXGI_FORMAT_R24_UNORM_X8_TYPELESS",
            Self::X24_TYPELESS_G8_UINT => "DXGI_FORMAT_X24_TYPELESS_G8_UINT",
            Self::R8G8_TYPELESS => "DXGI_FORMAT_R8G8_TYPELESS",
            Self::R8G8_UNORM => "DXGI_FORMAT_R8G8_UNORM",
            Self::R8G8_UINT => "DXGI_FORMAT_R8G8_UINT",
            Self::R8G8_SNORM => "DXGI_FORMAT_R8G8_SNORM",
            Self::R8G8_SINT => "DXGI_FORMAT_R8G8_SINT",
            Self::R16_TYPELESS => "DXGI_FORMAT_R16_TYPELESS",
            Self::R16_FLOAT => "DXGI_FORMAT_R16_FLOAT",
            Self::D16_UNORM => "DXGI_FORMAT_D16_UNORM",
            Self::R16_UNORM => "DXGI_FORMAT_R16_UNORM",
            Self::R16_UINT => "DXGI_FORMAT_R16_UINT",
            Self::R16_SNORM => "DXGI_FORMAT_R16_SNORM",
            Self::R16_SINT => "DXGI_FORMAT_R16_SINT",
            Self::R8_TYPELESS => "DXGI_FORMAT_R8_TYPELESS",
            Self::R8_UNORM => "DXGI_FORMAT_R8_UNORM",
            Self::R8_UINT => "DXGI_FORMAT_R8_UINT",
            Self::R8_SNORM => "DXGI_FORMAT_R8_SNORM",
            Self::R8_SINT => "DXGI_FORMAT_R8_SINT",
            Self::A8_UNORM => "DXGI_FORMAT_A8_UNORM",
            Self::R1_UNORM => "DXGI_FORMAT_R1_UNORM",
            Self::R9G9B9E5_SHAREDEXP => "DXGI_FORMAT_R9G9B9E5_SHAREDEXP",
            Self::R8G8_B8G8_UNORM => "DXGI_FORMAT_R8G8_B8G8_UNORM",
            Self::G8R8_G8B8_UNORM => "DXGI_FORMAT_G8R8_G8B8_UNORM",
            Self::B5G6R5_UNORM => "DXGI_FORMAT_B5G6R5_UNORM",
            Self::B5G5R5A1_UNORM => "DXGI_FORMAT_B5G5R5A1_UNORM",
            Self::B8G8R8A8_UNORM => "DXGI_FORMAT_B8G8R8A8_UNORM",
            Self::B8G8R8X8_UNORM => "DXGI_FORMAT_B8G8R8X8_UNORM",
            Self::R10G10B10_XR_BIAS_A2_UNORM => "DXGI_FORMAT_R10G10B10_XR_BIAS_A2_UNORM",
            Self::B8G8R8A8_TYPELESS => "DXGI_FORMAT_B8G8R8A8_TYPELESS",
            Self::B8G8R8A8_UNORM_SRGB => "DXGI_FORMAT_B8G8R8A8_UNORM_SRGB",
            Self::B8G8R8X8_TYPELESS => "DXGI_FORMAT_B8G8R8X8_TYPELESS",
            Self::B8G8R8X8_UNORM_SRGB => "DXGI_FORMAT_B8G8R8X8_UNORM_SRGB",
            Self::AYUV => "DXGI_FORMAT_AYUV",
            Self::Y410 => "DXGI_FORMAT_Y410",
            Self::Y416 => "DXGI_FORMAT_Y416",
            Self::NV12 => "DXGI_FORMAT_NV12",
            Self::P010 => "DXGI_FORMAT_P010",
            Self::P016 => "DXGI_FORMAT_P016",
            Self::OPAQUE_420 => "DXGI_FORMAT_420_OPAQUE",
            Self::YUY2 => "DXGI_FORMAT_YUY2",
            Self::Y210 => "DXGI_FORMAT_Y210",
            Self::Y216 => "DXGI_FORMAT_Y216",
            Self::NV11 => "DXGI_FORMAT_NV11",
            Self::AI44 => "DXGI_FORMAT_AI44",
            Self::IA44 => "DXGI_FORMAT_IA44",
            Self::P8 => "DXGI_FORMAT_P8",
            Self::A8P8 => "DXGI_FORMAT_A8P8",
            Self::B4G4R4A4_UNORM => "DXGI_FORMAT_B4G4R4A4_UNORM",
            _ => "DXGI_FORMAT_UNKNOWN",
        }
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::PixelFormat;

    #[test]
    fn desktop_formats_are_four_bytes() {
        for fmt in [
            PixelFormat::B8G8R8A8_UNORM,
            PixelFormat::B8G8R8X8_UNORM,
            PixelFormat::R8G8B8A8_UNORM,
            PixelFormat::R10G10B10A2_UNORM,
        ] {
            assert_eq!(fmt.bytes_per_pixel(), 4, "{fmt}");
        }
    }

    #[test]
    fn byte_sizes_follow_format_families() {
        assert_eq!(PixelFormat::R32G32B32A32_FLOAT.bytes_per_pixel(), 16);
        assert_eq!(PixelFormat::R32G32B32_UINT.bytes_per_pixel(), 12);
        assert_eq!(PixelFormat::R16G16B16A16_FLOAT.bytes_per_pixel(), 8);
        assert_eq!(PixelFormat::B5G6R5_UNORM.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::A8_UNORM.bytes_per_pixel(), 1);
        assert_eq!(PixelFormat::NV12.bytes_per_pixel(), 0);
        assert_eq!(PixelFormat::UNKNOWN.bytes_per_pixel(), 0);
    }

    #[test]
    fn only_bgr_family_reports_bgr_order() {
        assert!(PixelFormat::B8G8R8A8_UNORM.is_bgr_order());
        assert!(PixelFormat::B8G8R8X8_UNORM_SRGB.is_bgr_order());
        assert!(!PixelFormat::R8G8B8A8_UNORM.is_bgr_order());
    }

    #[test]
    fn names_round_out_unknown_values() {
        assert_eq!(PixelFormat::B8G8R8A8_UNORM.name(), "DXGI_FORMAT_B8G8R8A8_UNORM");
        assert_eq!(PixelFormat(9999).name(), "DXGI_FORMAT_UNKNOWN");
    }
}

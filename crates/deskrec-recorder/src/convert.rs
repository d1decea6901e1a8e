//! Packed BGRA → planar I420 (YUV 4:2:0) conversion.
//!
//! BT.601 coefficients evaluated in fixed point (scaled by 1000) so the result
//! is identical on every platform:
//!
//! ```text
//! Y =  0.299 R + 0.587 G + 0.114 B
//! U = -0.169 R - 0.331 G + 0.500 B + 128
//! V =  0.500 R - 0.419 G - 0.081 B + 128
//! ```
//!
//! Each chroma sample is the truncating average of the four per-pixel chroma
//! values of its 2×2 block. Odd widths and heights reuse the last column/row.

use deskrec_core::{DeskrecError, Result};

/// One frame in I420 layout: a full-resolution Y plane followed by U and V
/// planes of `ceil(w/2) × ceil(h/2)`, stored contiguously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanarFrame {
    width:  u32,
    height: u32,
    data:   Vec<u8>,
}

impl PlanarFrame {
    /// Allocate a zeroed frame. The storage is reused for every conversion.
    pub fn new(width: u32, height: u32) -> Self {
        let luma = width as usize * height as usize;
        let chroma = chroma_dim(width) * chroma_dim(height);
        Self { width, height, data: vec![0u8; luma + 2 * chroma] }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn chroma_width(&self) -> usize {
        chroma_dim(self.width)
    }

    pub fn chroma_height(&self) -> usize {
        chroma_dim(self.height)
    }

    fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn chroma_len(&self) -> usize {
        self.chroma_width() * self.chroma_height()
    }

    /// All three planes back to back (Y, U, V).
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn y(&self) -> &[u8] {
        &self.data[..self.luma_len()]
    }

    pub fn u(&self) -> &[u8] {
        let start = self.luma_len();
        &self.data[start..start + self.chroma_len()]
    }

    pub fn v(&self) -> &[u8] {
        let start = self.luma_len() + self.chroma_len();
        &self.data[start..]
    }

    fn planes_mut(&mut self) -> (&mut [u8], &mut [u8], &mut [u8]) {
        let luma = self.luma_len();
        let chroma = self.chroma_len();
        let (y, uv) = self.data.split_at_mut(luma);
        let (u, v) = uv.split_at_mut(chroma);
        (y, u, v)
    }
}

fn chroma_dim(n: u32) -> usize {
    (n as usize + 1) / 2
}

// ── Per-pixel transforms ──────────────────────────────────────────────────────

#[inline]
fn luma(r: i32, g: i32, b: i32) -> u8 {
    ((299 * r + 587 * g + 114 * b) / 1000).clamp(0, 255) as u8
}

#[inline]
fn chroma_u(r: i32, g: i32, b: i32) -> i32 {
    ((-169 * r - 331 * g + 500 * b + 128_000) / 1000).clamp(0, 255)
}

#[inline]
fn chroma_v(r: i32, g: i32, b: i32) -> i32 {
    ((500 * r - 419 * g - 81 * b + 128_000) / 1000).clamp(0, 255)
}

// ── Conversion ────────────────────────────────────────────────────────────────

/// Convert a tightly packed BGR(A) frame into `dst`.
///
/// Both dimensions must be non-zero and `bytes_per_pixel` at least 3; channels are read as B, G, R and any
/// further bytes (alpha) are ignored.
pub fn bgra_to_i420(src: &[u8], bytes_per_pixel: usize, dst: &mut PlanarFrame) -> Result<()> {
    let w = dst.width as usize;
    let h = dst.height as usize;
    if w == 0 || h == 0 || bytes_per_pixel < 3 {
        return Err(DeskrecError::InvalidDimensions {
            width:           dst.width,
            height:          dst.height,
            bytes_per_pixel: bytes_per_pixel as u32,
        });
    }
    let expected = w * h * bytes_per_pixel;
    if src.len() != expected {
        return Err(DeskrecError::FrameLengthMismatch { expected, actual: src.len() });
    }

    let cw = dst.chroma_width();
    let ch = dst.chroma_height();
    let (y_plane, u_plane, v_plane) = dst.planes_mut();

    let rgb = |x: usize, y: usize| -> (i32, i32, i32) {
        let i = (y * w + x) * bytes_per_pixel;
        (src[i + 2] as i32, src[i + 1] as i32, src[i] as i32)
    };

    for (y, row) in y_plane.chunks_exact_mut(w).enumerate() {
        for (x, out) in row.iter_mut().enumerate() {
            let (r, g, b) = rgb(x, y);
            *out = luma(r, g, b);
        }
    }

    for cy in 0..ch {
        let y0 = 2 * cy;
        let y1 = (y0 + 1).min(h - 1);
        for cx in 0..cw {
            let x0 = 2 * cx;
            let x1 = (x0 + 1).min(w - 1);

            let mut u_sum = 0;
            let mut v_sum = 0;
            for (x, y) in [(x0, y0), (x1, y0), (x0, y1), (x1, y1)] {
                let (r, g, b) = rgb(x, y);
                u_sum += chroma_u(r, g, b);
                v_sum += chroma_v(r, g, b);
            }
            u_plane[cy * cw + cx] = (u_sum / 4) as u8;
            v_plane[cy * cw + cx] = (v_sum / 4) as u8;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, bgra: [u8; 4]) -> Vec<u8> {
        bgra.iter().copied().cycle().take((w * h * 4) as usize).collect()
    }

    #[test]
    fn plane_sizes_round_chroma_up() {
        let frame = PlanarFrame::new(5, 3);
        assert_eq!(frame.y().len(), 15);
        assert_eq!(frame.u().len(), 3 * 2);
        assert_eq!(frame.v().len(), 3 * 2);
        assert_eq!(frame.as_bytes().len(), 15 + 12);
    }

    #[test]
    fn mid_gray_maps_to_mid_yuv() {
        let src = solid(4, 4, [128, 128, 128, 255]);
        let mut dst = PlanarFrame::new(4, 4);
        bgra_to_i420(&src, 4, &mut dst).unwrap();

        assert!(dst.y().iter().all(|&v| v.abs_diff(128) <= 1));
        assert!(dst.u().iter().all(|&v| v.abs_diff(128) <= 1));
        assert!(dst.v().iter().all(|&v| v.abs_diff(128) <= 1));
    }

    #[test]
    fn primaries_match_fixed_point_formulas() {
        // Pure red in BGRA order.
        let src = solid(2, 2, [0, 0, 255, 255]);
        let mut dst = PlanarFrame::new(2, 2);
        bgra_to_i420(&src, 4, &mut dst).unwrap();

        assert_eq!(dst.y()[0], (299 * 255 / 1000) as u8);
        assert_eq!(dst.u()[0], ((-169 * 255 + 128_000) / 1000) as u8);
        assert_eq!(dst.v()[0], ((500 * 255 + 128_000) / 1000) as u8);
    }

    #[test]
    fn block_shares_truncated_average_chroma() {
        // Four different colors in one 2×2 block.
        let pixels: [[u8; 4]; 4] = [
            [255, 0, 0, 255],
            [0, 255, 0, 255],
            [0, 0, 255, 255],
            [10, 200, 90, 255],
        ];
        let src: Vec<u8> = pixels.iter().flatten().copied().collect();
        let mut dst = PlanarFrame::new(2, 2);
        bgra_to_i420(&src, 4, &mut dst).unwrap();

        let expected_u = pixels
            .iter()
            .map(|p| chroma_u(p[2] as i32, p[1] as i32, p[0] as i32))
            .sum::<i32>()
            / 4;
        let expected_v = pixels
            .iter()
            .map(|p| chroma_v(p[2] as i32, p[1] as i32, p[0] as i32))
            .sum::<i32>()
            / 4;

        assert_eq!(dst.u(), &[expected_u as u8]);
        assert_eq!(dst.v(), &[expected_v as u8]);
    }

    #[test]
    fn odd_dimensions_duplicate_edge_pixels() {
        // 3×1: the last chroma block covers column 2 only, duplicated.
        let src = [
            0, 0, 0, 255, //
            0, 0, 0, 255, //
            255, 0, 0, 255,
        ];
        let mut dst = PlanarFrame::new(3, 1);
        bgra_to_i420(&src, 4, &mut dst).unwrap();

        assert_eq!(dst.u().len(), 2);
        assert_eq!(dst.u()[1] as i32, chroma_u(0, 0, 255));
        assert_eq!(dst.v()[1] as i32, chroma_v(0, 0, 255));
    }

    #[test]
    fn three_byte_pixels_are_accepted() {
        let src = [128u8; 2 * 2 * 3];
        let mut dst = PlanarFrame::new(2, 2);
        bgra_to_i420(&src, 3, &mut dst).unwrap();
        assert_eq!(dst.y(), &[128, 128, 128, 128]);
    }

    #[test]
    fn rejects_wrong_length_and_narrow_pixels() {
        let mut dst = PlanarFrame::new(2, 2);
        assert!(matches!(
            bgra_to_i420(&[0u8; 15], 4, &mut dst),
            Err(DeskrecError::FrameLengthMismatch { expected: 16, actual: 15 })
        ));
        assert!(matches!(
            bgra_to_i420(&[0u8; 8], 2, &mut dst),
            Err(DeskrecError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn conversion_is_deterministic() {
        let src: Vec<u8> = (0..6 * 4 * 4).map(|i| (i * 37 % 256) as u8).collect();
        let mut a = PlanarFrame::new(6, 4);
        let mut b = PlanarFrame::new(6, 4);
        bgra_to_i420(&src, 4, &mut a).unwrap();
        bgra_to_i420(&src, 4, &mut b).unwrap();
        assert_eq!(a, b);
    }
}

//! Latest-wins frame slot shared between the capture thread and the encoder.
//!
//! There is exactly one slot. Each write replaces its contents and every read
//! copies out the most recent complete write. Reads and writes hold the same
//! lock for the duration of the copy, so a reader never observes a frame that
//! is half old and half new. Nothing is queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use deskrec_core::{DeskrecError, Result};
use parking_lot::Mutex;

pub struct FrameBuffer {
    slot:   Mutex<Box<[u8]>>,
    len:    usize,
    writes: AtomicU64,
    closed: AtomicBool,
}

impl FrameBuffer {
    /// Allocate a zeroed slot of exactly `len` bytes. The size never changes.
    pub fn new(len: usize) -> Self {
        Self {
            slot:   Mutex::new(vec![0u8; len].into_boxed_slice()),
            len,
            writes: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Overwrite the slot with a tightly packed frame.
    pub fn write(&self, frame: &[u8]) -> Result<()> {
        if frame.len() != self.len {
            return Err(DeskrecError::FrameLengthMismatch {
                expected: self.len,
                actual:   frame.len(),
            });
        }
        self.slot.lock().copy_from_slice(frame);
        self.writes.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Overwrite the slot from a padded source image.
    ///
    /// `src_pitch` is the distance in bytes between the starts of two source
    /// rows; only the first `row_bytes` of each row are copied.
    pub fn write_rows(&self, src: &[u8], src_pitch: usize, row_bytes: usize) -> Result<()> {
        if row_bytes == 0 || self.len % row_bytes != 0 || src_pitch < row_bytes {
            return Err(DeskrecError::FrameLengthMismatch {
                expected: self.len,
                actual:   src.len(),
            });
        }
        let rows = self.len / row_bytes;
        let needed = if rows == 0 { 0 } else { (rows - 1) * src_pitch + row_bytes };
        if src.len() < needed {
            return Err(DeskrecError::FrameLengthMismatch { expected: needed, actual: src.len() });
        }

        {
            let mut slot = self.slot.lock();
            for (row, dst) in slot.chunks_exact_mut(row_bytes).enumerate() {
                let start = row * src_pitch;
                dst.copy_from_slice(&src[start..start + row_bytes]);
            }
        }
        self.writes.fetch_add(1, Ordering::Release);
        Ok(())
    }

    /// Copy the current frame into `out`. Never waits for a new frame.
    pub fn read_into(&self, out: &mut [u8]) -> Result<()> {
        if out.len() != self.len {
            return Err(DeskrecError::FrameLengthMismatch {
                expected: self.len,
                actual:   out.len(),
            });
        }
        out.copy_from_slice(&self.slot.lock());
        Ok(())
    }

    /// Number of completed writes since allocation.
    pub fn frames_written(&self) -> u64 {
        self.writes.load(Ordering::Acquire)
    }

    /// Mark that the producer has exited and no further writes will arrive.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    pub(crate) fn reopen(&self) {
        self.closed.store(false, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBuffer")
            .field("len", &self.len)
            .field("frames_written", &self.frames_written())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn capacity_matches_geometry() {
        for (w, h, bpp) in [(1usize, 1usize, 1usize), (800, 600, 4), (3, 5, 2), (1920, 1080, 4)] {
            let buf = FrameBuffer::new(w * h * bpp);
            assert_eq!(buf.len(), w * h * bpp);
        }
    }

    #[test]
    fn write_rejects_wrong_length_and_keeps_capacity() {
        let buf = FrameBuffer::new(16);
        assert!(matches!(
            buf.write(&[0u8; 15]),
            Err(DeskrecError::FrameLengthMismatch { expected: 16, actual: 15 })
        ));
        buf.write(&[7u8; 16]).unwrap();
        assert_eq!(buf.len(), 16);

        let mut out = [0u8; 16];
        buf.read_into(&mut out).unwrap();
        assert_eq!(out, [7u8; 16]);
        assert_eq!(buf.frames_written(), 1);
    }

    #[test]
    fn write_rows_skips_source_padding() {
        // 2 rows of 3 bytes, source pitch 5: the last 2 bytes of each row are padding.
        let src = [1, 2, 3, 0xEE, 0xEE, 4, 5, 6, 0xEE, 0xEE];
        let buf = FrameBuffer::new(6);
        buf.write_rows(&src, 5, 3).unwrap();

        let mut out = [0u8; 6];
        buf.read_into(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn write_rows_accepts_unpadded_last_row() {
        let src = [1, 2, 0xEE, 3, 4];
        let buf = FrameBuffer::new(4);
        buf.write_rows(&src, 3, 2).unwrap();

        let mut out = [0u8; 4];
        buf.read_into(&mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn write_rows_rejects_short_source() {
        let buf = FrameBuffer::new(6);
        assert!(buf.write_rows(&[0u8; 7], 5, 3).is_err());
        assert!(buf.write_rows(&[0u8; 10], 2, 3).is_err());
        assert_eq!(buf.frames_written(), 0);
    }

    #[test]
    fn concurrent_reads_never_observe_torn_frames() {
        const LEN: usize = 64 * 1024;
        const ROUNDS: usize = 2_000;

        let buf = Arc::new(FrameBuffer::new(LEN));
        let writer = {
            let buf = Arc::clone(&buf);
            thread::spawn(move || {
                let dark = vec![0x00u8; LEN];
                let light = vec![0xFFu8; LEN];
                for i in 0..ROUNDS {
                    let frame = if i % 2 == 0 { &dark } else { &light };
                    buf.write(frame).unwrap();
                }
            })
        };

        let mut out = vec![0u8; LEN];
        for _ in 0..ROUNDS {
            buf.read_into(&mut out).unwrap();
            let first = out[0];
            assert!(first == 0x00 || first == 0xFF);
            assert!(out.iter().all(|&b| b == first), "torn frame observed");
        }

        writer.join().unwrap();
        assert_eq!(buf.frames_written(), ROUNDS as u64);
    }

    #[test]
    fn close_is_observable() {
        let buf = FrameBuffer::new(4);
        assert!(!buf.is_closed());
        buf.close();
        assert!(buf.is_closed());
        buf.reopen();
        assert!(!buf.is_closed());
    }
}

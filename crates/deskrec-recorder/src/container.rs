//! Output containers.
//!
//! The only built-in format is the raw H.264 Annex B elementary stream
//! (`.h264`): no header or trailer bytes, packets appended as produced.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use deskrec_core::{DeskrecError, EncodedPacket, Result};
use tracing::debug;

pub const DEFAULT_CONTAINER: &str = "annexb";

/// A container factory.
pub trait ContainerFormat: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare a container for `path`. Nothing is created on disk until
    /// [`Container::write_header`].
    fn create(&self, path: &Path) -> Result<Box<dyn Container>>;
}

/// One open output file holding a single video stream.
pub trait Container: Send {
    fn write_header(&mut self) -> Result<()>;

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()>;

    /// Finish the file and release the handle. No writes are accepted after.
    fn write_trailer(&mut self) -> Result<()>;
}

pub fn by_name(name: &str) -> Result<Arc<dyn ContainerFormat>> {
    match name.to_ascii_lowercase().as_str() {
        "annexb" | "h264" | "raw" => Ok(Arc::new(AnnexB)),
        _ => Err(DeskrecError::ConfigurationInvalid {
            reason: format!("unknown container {name:?} (available: annexb)"),
        }),
    }
}

// ── Annex B ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct AnnexB;

impl ContainerFormat for AnnexB {
    fn name(&self) -> &'static str {
        "annexb"
    }

    fn create(&self, path: &Path) -> Result<Box<dyn Container>> {
        Ok(Box::new(AnnexBFile { path: path.to_path_buf(), writer: None, bytes: 0 }))
    }
}

struct AnnexBFile {
    path:   PathBuf,
    writer: Option<BufWriter<File>>,
    bytes:  u64,
}

impl AnnexBFile {
    fn writer(&mut self) -> Result<&mut BufWriter<File>> {
        self.writer.as_mut().ok_or(DeskrecError::OutputNotOpen)
    }
}

impl Container for AnnexBFile {
    fn write_header(&mut self) -> Result<()> {
        let file = File::create(&self.path)?;
        self.writer = Some(BufWriter::new(file));
        debug!(path = %self.path.display(), "[AnnexB] created");
        Ok(())
    }

    fn write_packet(&mut self, packet: &EncodedPacket) -> Result<()> {
        let writer = self.writer()?;
        writer.write_all(&packet.data)?;
        self.bytes += packet.data.len() as u64;
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        let Some(writer) = self.writer.take() else {
            return Err(DeskrecError::OutputNotOpen);
        };
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        debug!(path = %self.path.display(), bytes = self.bytes, "[AnnexB] finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(data: &[u8], pts: i64) -> EncodedPacket {
        EncodedPacket { data: data.to_vec(), pts, is_keyframe: pts == 0 }
    }

    #[test]
    fn packets_are_appended_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.h264");

        let mut out = AnnexB.create(&path).unwrap();
        assert!(!path.exists());
        out.write_header().unwrap();
        out.write_packet(&packet(&[0, 0, 0, 1, 0x67], 0)).unwrap();
        out.write_packet(&packet(&[0, 0, 0, 1, 0x41], 1)).unwrap();
        out.write_trailer().unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), [0, 0, 0, 1, 0x67, 0, 0, 0, 1, 0x41]);
    }

    #[test]
    fn writes_after_trailer_fail() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = AnnexB.create(&dir.path().join("out.h264")).unwrap();
        out.write_header().unwrap();
        out.write_trailer().unwrap();
        assert!(matches!(out.write_packet(&packet(&[1], 0)), Err(DeskrecError::OutputNotOpen)));
        assert!(matches!(out.write_trailer(), Err(DeskrecError::OutputNotOpen)));
    }

    #[test]
    fn header_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut out = AnnexB.create(&dir.path().join("missing").join("out.h264")).unwrap();
        assert!(matches!(out.write_header(), Err(DeskrecError::Io(_))));
    }

    #[test]
    fn lookup_by_name() {
        assert_eq!(by_name("AnnexB").unwrap().name(), "annexb");
        assert!(by_name("mp4").err().unwrap().is_configuration());
    }
}

//! deskrec — record a desktop display to an H.264 file.
//!
//! ```text
//! deskrec --surface '\\.\DISPLAY1' --fps 30 --bitrate 4000000 --output out.h264
//! deskrec --synthetic 800x600 --duration 5          # no capture hardware needed
//! deskrec --list-surfaces
//! ```
//!
//! Runs until Ctrl-C, `--duration` elapses, or the session ends on its own
//! (capture lost, encoder failure). The output is always flushed and closed.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use deskrec_capture::{CaptureBackend, SyntheticBackend, SyntheticSurface};
use deskrec_core::RecordingConfig;
use deskrec_recorder::{codec, container, Recorder, RecorderEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "deskrec", about = "Record a desktop display to an H.264 file", author, version)]
struct Cli {
    /// JSON configuration file; flags below override its fields.
    #[arg(long, env = "DESKREC_CONFIG")]
    config: Option<PathBuf>,

    /// Display output device name, e.g. \\.\DISPLAY1.
    #[arg(long)]
    surface: Option<String>,

    /// Target frames per second.
    #[arg(long)]
    fps: Option<u32>,

    /// Target bitrate in bits per second.
    #[arg(long)]
    bitrate: Option<u32>,

    /// Output file (overwritten).
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Stop after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Compressor backend.
    #[arg(long, default_value = codec::DEFAULT_CODEC)]
    codec: String,

    /// Output container format.
    #[arg(long, default_value = container::DEFAULT_CONTAINER)]
    container: String,

    /// Capture a generated test pattern of the given size (WxH) instead of a display.
    #[arg(long, value_name = "WxH", value_parser = parse_geometry)]
    synthetic: Option<(u32, u32)>,

    /// Print the capturable display outputs and exit.
    #[arg(long)]
    list_surfaces: bool,
}

impl Cli {
    fn recording_config(&self) -> Result<RecordingConfig> {
        let mut cfg = match &self.config {
            Some(path) => RecordingConfig::from_json_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => RecordingConfig::default(),
        };
        if let Some(surface) = &self.surface {
            cfg.surface = surface.clone();
        }
        if let Some(fps) = self.fps {
            cfg.target_fps = fps;
        }
        if let Some(bitrate) = self.bitrate {
            cfg.bitrate_bps = bitrate;
        }
        if let Some(output) = &self.output {
            cfg.output = output.clone();
        }
        cfg.validate().context("invalid configuration")?;
        Ok(cfg)
    }
}

fn parse_geometry(s: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {s:?}"))?;
    let w: u32 = w.trim().parse().map_err(|e| format!("width: {e}"))?;
    let h: u32 = h.trim().parse().map_err(|e| format!("height: {e}"))?;
    if w == 0 || h == 0 {
        return Err("width and height must be non-zero".into());
    }
    Ok((w, h))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!("deskrec v{}", env!("CARGO_PKG_VERSION"));

    let config = cli.recording_config()?;
    let backend: Arc<dyn CaptureBackend> = match cli.synthetic {
        Some((w, h)) => Arc::new(SyntheticBackend::new(vec![SyntheticSurface::new(
            config.surface.clone(),
            w,
            h,
        )])),
        None => deskrec_capture::default_backend(),
    };

    if cli.list_surfaces {
        for name in backend.surfaces().context("enumerating display outputs")? {
            println!("{name}");
        }
        return Ok(());
    }

    let codec = codec::by_name(&cli.codec)?;
    let container = container::by_name(&cli.container)?;
    let (event_tx, mut event_rx) = mpsc::channel::<RecorderEvent>(64);

    let mut recorder = Recorder::new(config, backend, codec, container).with_events(event_tx);
    recorder.start().context("starting recorder")?;

    let deadline = async {
        match cli.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await,
            None => std::future::pending().await,
        }
    };
    tokio::pin!(deadline);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, stopping");
                break;
            }
            _ = &mut deadline => {
                info!("Duration elapsed, stopping");
                break;
            }
            maybe_ev = event_rx.recv() => {
                match maybe_ev {
                    Some(RecorderEvent::Ended { reason }) => {
                        warn!("Recording ended: {reason}");
                        break;
                    }
                    Some(RecorderEvent::Progress { frames, fps }) => {
                        info!(frames, "{fps:.0} fps");
                    }
                    Some(RecorderEvent::State(state)) => debug!("state → {state}"),
                    None => break,
                }
            }
        }
    }

    let stats = recorder.stop().context("stopping recorder")?;
    if let Some(stats) = stats {
        info!("Recording stats: {}", serde_json::to_string(&stats)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geometry_parses_both_separators() {
        assert_eq!(parse_geometry("800x600"), Ok((800, 600)));
        assert_eq!(parse_geometry("1920X1080"), Ok((1920, 1080)));
        assert!(parse_geometry("800").is_err());
        assert!(parse_geometry("0x600").is_err());
    }

    #[test]
    fn flags_override_config_defaults() {
        let cli = Cli::parse_from(["deskrec", "--fps", "60", "--output", "x.h264"]);
        let cfg = cli.recording_config().unwrap();
        assert_eq!(cfg.target_fps, 60);
        assert_eq!(cfg.output, PathBuf::from("x.h264"));
        assert_eq!(cfg.bitrate_bps, 4_000_000);
    }

    #[test]
    fn invalid_flags_fail_validation() {
        let cli = Cli::parse_from(["deskrec", "--fps", "0"]);
        assert!(cli.recording_config().is_err());
    }
}

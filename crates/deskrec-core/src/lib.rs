pub mod config;
pub mod errors;
pub mod format;
pub mod types;

pub use config::RecordingConfig;
pub use errors::{DeskrecError, Result};
pub use format::PixelFormat;
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DeskrecError {
    // -- Capture device --

    #[error("Capture device unavailable: {reason}")]
    DeviceError { reason: String },

    #[error("Display surface not found: {surface}")]
    SurfaceNotFound { surface: String },

    #[error("Desktop duplication unavailable: {reason}")]
    DuplicationUnavailable { reason: String },

    #[error("Timed out after {ms}ms waiting for a captured frame")]
    CaptureTimeout { ms: u64 },

    #[error("Component used before initialize()")]
    NotInitialized,

    // -- Configuration --

    #[error("Invalid dimensions {width}x{height} at {bytes_per_pixel} bytes/pixel")]
    InvalidDimensions { width: u32, height: u32, bytes_per_pixel: u32 },

    #[error("Invalid frame rate: {rate}")]
    InvalidRate { rate: u32 },

    #[error("Invalid bitrate: {bitrate}")]
    InvalidBitrate { bitrate: u32 },

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Frame length mismatch: expected {expected} bytes, got {actual}")]
    FrameLengthMismatch { expected: usize, actual: usize },

    // -- Encoder / container --

    #[error("Encoder rejected frame: {reason}")]
    EncodeSubmitError { reason: String },

    #[error("Failed to retrieve encoded packet: {reason}")]
    EncodeDrainError { reason: String },

    #[error("Output is not open")]
    OutputNotOpen,

    #[error("Failed to open output {destination}: {reason}")]
    OutputOpenError { destination: String, reason: String },

    #[error("Failed to close output: {reason}")]
    OutputCloseError { reason: String },

    // -- Session --

    #[error("{thread} thread panicked")]
    ThreadPanicked { thread: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeskrecError {
    /// True for errors raised by bad configuration, before anything was allocated.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidDimensions { .. }
                | Self::InvalidRate { .. }
                | Self::InvalidBitrate { .. }
                | Self::ConfigurationInvalid { .. }
        )
    }
}

pub type Result<T, E = DeskrecError> = std::result::Result<T, E>;

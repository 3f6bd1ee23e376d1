//! Error types for VTALK

use thiserror::Error;

/// Core VTALK errors
#[derive(Error, Debug)]
pub enum VtalkError {
    // Audio errors
    #[error("Audio decode failed: {0}")]
    AudioDecode(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedAudio(String),

    // Session errors
    #[error("No active lip-sync session")]
    NoActiveSession,

    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(f32),

    #[error("Frame loop failed: {0}")]
    FrameLoop(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // Server errors
    #[error("Server error: {0}")]
    Server(String),
}

/// Result type for VTALK operations
pub type VtalkResult<T> = Result<T, VtalkError>;

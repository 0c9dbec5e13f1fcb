//! Animator error types

use thiserror::Error;

/// Animator-related errors
#[derive(Error, Debug)]
pub enum AnimatorError {
    /// Duration was zero
    #[error("Invalid animation duration: {0}")]
    InvalidDuration(String),

    /// Frame rate was zero
    #[error("Invalid frame rate: {0}")]
    InvalidFrameRate(String),

    /// Failed to parse configuration
    #[error("Failed to parse animator config: {0}")]
    Config(#[from] toml::de::Error),

    /// Failed to serialize configuration
    #[error("Failed to serialize animator config: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// Failed to start the frame thread
    #[error("Frame thread failed: {0}")]
    FrameThread(String),
}

/// Result type for animator operations
pub type Result<T> = std::result::Result<T, AnimatorError>;

//! Error types for voxlink.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxlinkError {
    // Capture acquisition errors
    #[error("Microphone permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Audio device unavailable: {device}")]
    DeviceUnavailable { device: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transport errors
    #[error("Transport channel error: {message}")]
    Channel { message: String },

    #[error("Invalid server URL: {url}")]
    InvalidUrl { url: String },

    // Inbound message errors
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Model error: {message}")]
    Model { message: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxlinkError>;

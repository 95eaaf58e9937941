//! Error types for voxdesk.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    // Audio source errors
    #[error("Unsupported audio format: {message}")]
    Format { message: String },

    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Audio device error: {message}")]
    Device { message: String },

    // Recognition errors
    #[error("Recognition failed: {message}")]
    Recognition { message: String },

    #[error("{resource} used after it was freed")]
    ResourceClosed { resource: String },

    #[error("Invalid session state: {message}")]
    SessionState { message: String },

    // Persistence errors
    #[error("Store error: {message}")]
    Store { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

/// Coarse classification used by callers to decide between aborting,
/// retrying with a different input, or reporting a defect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Fatal, never retried: bad config, sample-rate mismatch, missing model.
    Configuration,
    /// Fatal for one source; the caller may retry with another file.
    Format,
    /// A freed recognizer or stream was touched. Always a bug.
    ResourceClosed,
    /// Capture device unavailable or lost; reconnection is the caller's call.
    Device,
    /// Anything else (I/O, IPC, store, inference).
    Other,
}

impl VoxError {
    /// Shorthand for a `Configuration` error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a `Format` error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration { .. } | Self::ConfigParse(_) => ErrorCategory::Configuration,
            Self::Format { .. } => ErrorCategory::Format,
            Self::ResourceClosed { .. } => ErrorCategory::ResourceClosed,
            Self::AudioDeviceNotFound { .. } | Self::Device { .. } => ErrorCategory::Device,
            _ => ErrorCategory::Other,
        }
    }

    /// True when trying again (another file, a reconnected device) can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Format | ErrorCategory::Device
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxError>;

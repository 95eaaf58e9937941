//! voxdesk - Desktop host for streaming speech recognition
//!
//! Feeds live or file audio through a streaming recognizer, emits partial and
//! final transcripts, and serves a local IPC bridge for store, log and
//! recognition requests.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod device;
pub mod error;
pub mod ipc;
pub mod logging;
pub mod recognizer;
pub mod session;
pub mod sink;
pub mod store;
pub mod stt;
pub mod sys;

// Composition root
#[cfg(feature = "cli")]
pub mod app;

// Core seams (source → recognizer → sink)
pub use audio::{AudioFormat, AudioFrame, AudioSource, SourceEvent};
pub use recognizer::{RecognizerConfig, RecognizerFactory, StreamingRecognizer};
pub use sink::{RecognitionEvent, ResultSink};
pub use stt::Transcriber;

// Session
pub use session::{
    RecognitionSession, SessionHandle, SessionState, SessionSummary, StopHandle, decode_file,
};

// Error handling
pub use error::{ErrorCategory, Result, VoxError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

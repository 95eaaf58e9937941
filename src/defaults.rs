//! Default configuration constants for voxdesk.
//!
//! Shared by the config file, the recognizer and the audio sources so the
//! same numbers are used everywhere.

/// Default audio sample rate in Hz.
///
/// The streaming models expect 16kHz mono input.
pub const SAMPLE_RATE: u32 = 16000;

/// Channel count every source must deliver.
pub const CHANNELS: u16 = 1;

/// Feature dimension (fbank bins) the acoustic model was trained with.
pub const FEATURE_DIM: u32 = 80;

/// Beam width used by `modified_beam_search`.
pub const MAX_ACTIVE_PATHS: u32 = 4;

/// Inference threads for the model backend.
pub const NUM_THREADS: u32 = 1;

/// Default language hint passed to the model backend.
pub const DEFAULT_LANGUAGE: &str = "auto";

/// Language value that triggers automatic language detection.
pub const AUTO_LANGUAGE: &str = "auto";

/// Endpoint rule 1: trailing silence (seconds) that ends an utterance even
/// when nothing was decoded.
pub const RULE1_MIN_TRAILING_SILENCE: f32 = 2.4;

/// Endpoint rule 2: trailing silence (seconds) that ends an utterance once
/// non-silence was decoded.
pub const RULE2_MIN_TRAILING_SILENCE: f32 = 1.2;

/// Endpoint rule 3: utterance length (seconds) that forces an endpoint.
pub const RULE3_MIN_UTTERANCE_LENGTH: f32 = 20.0;

/// Audio consumed by one decode step of the transcriber-backed recognizer.
pub const DECODE_CHUNK_MS: u32 = 100;

/// New speech (ms) that triggers another transcriber pass while the
/// speaker keeps talking.
pub const HYPOTHESIS_REFRESH_MS: u32 = 1000;

/// RMS level (0.0 to 1.0) below which a decode chunk counts as silence.
pub const SILENCE_THRESHOLD: f32 = 0.01;

/// Silence appended after the last frame of a decoded file, in seconds.
///
/// Must exceed the largest trailing-silence rule so the endpoint can fire
/// on the final utterance.
pub const TAIL_PADDING_SECS: f32 = 2.5;

/// Bytes read from a WAV file per emitted frame (2048 16-bit samples).
pub const READ_CHUNK_BYTES: usize = 4096;

/// How long the session waits for a source event before re-checking stop.
pub const SOURCE_POLL_MS: u64 = 50;

/// Days a log file is kept before startup pruning deletes it.
pub const LOG_RETENTION_DAYS: u32 = 15;

/// Size at which the active log file is moved aside.
pub const LOG_MAX_FILE_BYTES: u64 = 10 * 1024 * 1024;

/// Prefix wrapped around every persisted key: `__<prefix>__<key>__`.
pub const STORE_KEY_PREFIX: &str = "hr_ai";

/// Application directory name under the platform config/data dirs.
pub const APP_DIR: &str = "voxdesk";

//! Audio sources: live capture, WAV decoding and replay.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod frame;
pub mod source;
pub mod wav;

pub use frame::{AudioFormat, AudioFrame, Samples, calculate_rms};
pub use source::{AudioSource, ReplayCounters, ReplaySource, SourceEvent};
pub use wav::{FileDecodeOptions, FileDecodeSource};

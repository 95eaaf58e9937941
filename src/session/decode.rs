//! One-shot decoding of finite sources.

use super::RecognitionSession;
use crate::audio::{AudioSource, FileDecodeOptions, FileDecodeSource};
use crate::error::Result;
use crate::recognizer::{RecognizerConfig, RecognizerFactory};
use crate::sink::CollectorSink;
use std::path::Path;

/// Run a finite source to completion and return the final segments in order.
pub fn decode_source<F: RecognizerFactory>(
    source: Box<dyn AudioSource>,
    config: &RecognizerConfig,
    factory: F,
) -> Result<Vec<String>> {
    let collector = CollectorSink::new();
    let mut session = RecognitionSession::new(config.clone(), factory, collector.clone())?;
    session.start(source)?;
    let summary = session.run()?;
    log::info!(
        "Decoded {} segment(s) from {} frame(s)",
        summary.segments,
        summary.frames
    );
    Ok(collector.finals())
}

/// Decode a mono 16-bit WAV file.
///
/// The pad is checked against the endpoint rules and the container against
/// the recognizer rate before any model is built.
pub fn decode_file<F: RecognizerFactory>(
    path: &Path,
    config: &RecognizerConfig,
    options: FileDecodeOptions,
    factory: F,
) -> Result<Vec<String>> {
    options.validate_against(&config.endpoint)?;
    let source = FileDecodeSource::open(path, config.sample_rate(), options)?;
    log::info!(
        "Decoding {} ({} samples)",
        path.display(),
        source.sample_count()
    );
    decode_source(Box::new(source), config, factory)
}

//! Streaming recognizer contract.
//!
//! A recognizer turns normalized audio into a running hypothesis through a
//! per-session decoding stream. The protocol mirrors online transducer
//! decoders: feed audio, drain ready decode steps, then read the hypothesis
//! and the endpoint flag.
//!
//! Freeing takes ownership. A stream or recognizer cannot be used after it
//! was released, and cannot be released twice.

pub mod chunked;
pub mod config;
pub mod endpoint;
pub mod scripted;

pub use chunked::TranscriberRecognizer;
pub use config::{
    DecoderConfig, DecodingMethod, FeatureConfig, ModelConfig, Provider, RecognizerConfig,
};
pub use endpoint::{EndpointConfig, EndpointRule};
pub use scripted::{RecognizerLedger, ScriptStep, ScriptedRecognizer};

use crate::error::{Result, VoxError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub trait StreamingRecognizer: Send {
    /// Per-session decoding state.
    type Stream: Send;

    fn config(&self) -> &RecognizerConfig;

    /// Rate `accept_waveform` requires.
    fn sample_rate(&self) -> u32 {
        self.config().feature.sample_rate
    }

    /// Fresh decoding state. `Configuration` if the model is not loaded.
    fn create_stream(&self) -> Result<Self::Stream>;

    /// Append normalized samples. A rate other than `sample_rate()` is a
    /// `Configuration` error.
    fn accept_waveform(
        &self,
        stream: &mut Self::Stream,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<()>;

    /// Enough buffered audio for one decode step.
    fn is_ready(&self, stream: &Self::Stream) -> bool;

    /// Consume one step of buffered audio.
    fn decode(&self, stream: &mut Self::Stream) -> Result<()>;

    fn is_endpoint(&self, stream: &Self::Stream) -> bool;

    /// Current hypothesis for the utterance since the last reset.
    fn get_result(&self, stream: &Self::Stream) -> String;

    /// Clear hypothesis and endpoint state. Buffered audio is kept.
    fn reset(&self, stream: &mut Self::Stream);

    fn free_stream(&self, stream: Self::Stream) {
        drop(stream);
    }

    fn free(self)
    where
        Self: Sized,
    {
    }
}

/// Builds a recognizer for a session.
pub trait RecognizerFactory: Send {
    type Recognizer: StreamingRecognizer;

    fn build(&self, config: &RecognizerConfig) -> Result<Self::Recognizer>;
}

impl<F, R> RecognizerFactory for F
where
    F: Fn(&RecognizerConfig) -> Result<R> + Send,
    R: StreamingRecognizer,
{
    type Recognizer = R;

    fn build(&self, config: &RecognizerConfig) -> Result<R> {
        self(config)
    }
}

/// A recognizer several sessions can use. Each call takes the lock; the
/// inner recognizer is freed when the last clone is freed.
pub struct SharedRecognizer<R> {
    inner: Arc<Mutex<R>>,
    config: RecognizerConfig,
}

impl<R: StreamingRecognizer> SharedRecognizer<R> {
    pub fn new(recognizer: R) -> Self {
        let config = recognizer.config().clone();
        Self {
            inner: Arc::new(Mutex::new(recognizer)),
            config,
        }
    }

    fn lock(&self) -> MutexGuard<'_, R> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of live handles, this one included.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl<R> Clone for SharedRecognizer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            config: self.config.clone(),
        }
    }
}

impl<R: StreamingRecognizer> StreamingRecognizer for SharedRecognizer<R> {
    type Stream = R::Stream;

    fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    fn create_stream(&self) -> Result<Self::Stream> {
        self.lock().create_stream()
    }

    fn accept_waveform(
        &self,
        stream: &mut Self::Stream,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<()> {
        self.lock().accept_waveform(stream, sample_rate, samples)
    }

    fn is_ready(&self, stream: &Self::Stream) -> bool {
        self.lock().is_ready(stream)
    }

    fn decode(&self, stream: &mut Self::Stream) -> Result<()> {
        self.lock().decode(stream)
    }

    fn is_endpoint(&self, stream: &Self::Stream) -> bool {
        self.lock().is_endpoint(stream)
    }

    fn get_result(&self, stream: &Self::Stream) -> String {
        self.lock().get_result(stream)
    }

    fn reset(&self, stream: &mut Self::Stream) {
        self.lock().reset(stream)
    }

    fn free_stream(&self, stream: Self::Stream) {
        self.lock().free_stream(stream)
    }

    fn free(self) {
        if let Ok(mutex) = Arc::try_unwrap(self.inner) {
            mutex
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner)
                .free();
        }
    }
}

/// Reject a sample rate the recognizer was not configured for.
pub(crate) fn check_sample_rate(config: &RecognizerConfig, sample_rate: u32) -> Result<()> {
    if sample_rate == config.feature.sample_rate {
        Ok(())
    } else {
        Err(VoxError::configuration(format!(
            "sample rate {} does not match recognizer rate {}",
            sample_rate, config.feature.sample_rate
        )))
    }
}

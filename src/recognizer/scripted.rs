//! Deterministic recognizer for tests and benchmarks.

use crate::defaults;
use crate::error::{Result, VoxError};
use crate::recognizer::{RecognizerConfig, StreamingRecognizer, check_sample_rate};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What one decode step does to the hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptStep {
    /// New hypothesis, or `None` to keep the current one.
    pub text: Option<String>,
    pub endpoint: bool,
}

impl ScriptStep {
    pub fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            endpoint: false,
        }
    }

    /// Set the hypothesis and flag an endpoint in the same step.
    pub fn endpoint(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            endpoint: true,
        }
    }

    /// Leave the hypothesis as it is.
    pub fn hold() -> Self {
        Self {
            text: None,
            endpoint: false,
        }
    }

    /// Flag an endpoint without touching the hypothesis.
    pub fn hold_endpoint() -> Self {
        Self {
            text: None,
            endpoint: true,
        }
    }
}

/// Call counts kept by a `ScriptedRecognizer`, shared with the test.
#[derive(Debug, Default)]
pub struct RecognizerLedger {
    streams_created: AtomicUsize,
    streams_freed: AtomicUsize,
    recognizers_freed: AtomicUsize,
    waveform_calls: AtomicUsize,
    decode_calls: AtomicUsize,
    resets: AtomicUsize,
    stale_reads: AtomicUsize,
}

impl RecognizerLedger {
    pub fn streams_created(&self) -> usize {
        self.streams_created.load(Ordering::SeqCst)
    }

    pub fn streams_freed(&self) -> usize {
        self.streams_freed.load(Ordering::SeqCst)
    }

    pub fn recognizers_freed(&self) -> usize {
        self.recognizers_freed.load(Ordering::SeqCst)
    }

    pub fn waveform_calls(&self) -> usize {
        self.waveform_calls.load(Ordering::SeqCst)
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }

    pub fn resets(&self) -> usize {
        self.resets.load(Ordering::SeqCst)
    }

    /// Results read while a decode step was still pending.
    pub fn stale_reads(&self) -> usize {
        self.stale_reads.load(Ordering::SeqCst)
    }
}

/// Stream state of a `ScriptedRecognizer`.
#[derive(Debug)]
pub struct ScriptedStream {
    pending: usize,
    step: usize,
    text: String,
    endpoint: bool,
}

/// Recognizer that replays a script, one step per decoded chunk.
///
/// Once the script is exhausted, further steps change nothing.
pub struct ScriptedRecognizer {
    config: RecognizerConfig,
    script: Vec<ScriptStep>,
    chunk_samples: usize,
    fail_create: bool,
    ledger: Arc<RecognizerLedger>,
}

impl ScriptedRecognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        let chunk_samples =
            (config.feature.sample_rate as usize * defaults::DECODE_CHUNK_MS as usize / 1000).max(1);
        Self {
            config,
            script: Vec::new(),
            chunk_samples,
            fail_create: false,
            ledger: Arc::new(RecognizerLedger::default()),
        }
    }

    pub fn with_script(mut self, script: Vec<ScriptStep>) -> Self {
        self.script = script;
        self
    }

    /// Samples consumed per decode step.
    pub fn with_chunk_samples(mut self, samples: usize) -> Self {
        self.chunk_samples = samples.max(1);
        self
    }

    /// Behave like a recognizer whose model failed to load.
    pub fn with_create_failure(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Record into an existing ledger, so recognizers built by a factory
    /// can be observed from outside.
    pub fn with_ledger(mut self, ledger: Arc<RecognizerLedger>) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn ledger(&self) -> Arc<RecognizerLedger> {
        Arc::clone(&self.ledger)
    }

    pub fn chunk_samples(&self) -> usize {
        self.chunk_samples
    }
}

impl StreamingRecognizer for ScriptedRecognizer {
    type Stream = ScriptedStream;

    fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    fn create_stream(&self) -> Result<ScriptedStream> {
        if self.fail_create {
            return Err(VoxError::configuration("scripted model is not loaded"));
        }
        self.ledger.streams_created.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedStream {
            pending: 0,
            step: 0,
            text: String::new(),
            endpoint: false,
        })
    }

    fn accept_waveform(
        &self,
        stream: &mut ScriptedStream,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<()> {
        check_sample_rate(&self.config, sample_rate)?;
        self.ledger.waveform_calls.fetch_add(1, Ordering::SeqCst);
        stream.pending += samples.len();
        Ok(())
    }

    fn is_ready(&self, stream: &ScriptedStream) -> bool {
        stream.pending >= self.chunk_samples
    }

    fn decode(&self, stream: &mut ScriptedStream) -> Result<()> {
        if stream.pending < self.chunk_samples {
            return Ok(());
        }
        self.ledger.decode_calls.fetch_add(1, Ordering::SeqCst);
        stream.pending -= self.chunk_samples;
        if let Some(step) = self.script.get(stream.step) {
            if let Some(text) = &step.text {
                stream.text = text.clone();
            }
            stream.endpoint |= step.endpoint;
        }
        stream.step += 1;
        Ok(())
    }

    fn is_endpoint(&self, stream: &ScriptedStream) -> bool {
        stream.endpoint
    }

    fn get_result(&self, stream: &ScriptedStream) -> String {
        if self.is_ready(stream) {
            self.ledger.stale_reads.fetch_add(1, Ordering::SeqCst);
        }
        stream.text.clone()
    }

    fn reset(&self, stream: &mut ScriptedStream) {
        self.ledger.resets.fetch_add(1, Ordering::SeqCst);
        stream.text.clear();
        stream.endpoint = false;
    }

    fn free_stream(&self, stream: ScriptedStream) {
        self.ledger.streams_freed.fetch_add(1, Ordering::SeqCst);
        drop(stream);
    }

    fn free(self) {
        self.ledger.recognizers_freed.fetch_add(1, Ordering::SeqCst);
    }
}

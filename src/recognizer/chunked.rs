//! Streaming adapter over a batch transcriber.
//!
//! Audio is decoded in fixed chunks. Each chunk is classified by RMS energy:
//! speech extends the utterance, silence only advances the trailing-silence
//! clock. The endpoint rules then decide whether the utterance is over.
//!
//! The transcriber sees the whole utterance on every call, so the hypothesis
//! is refreshed only on the first speech chunk, after `refresh_ms` of new
//! audio, on a speech-to-silence edge, and when an endpoint fires with
//! untranscribed speech. Work per utterance stays linear in its length.
//!
//! The endpoint flag is latched until `reset`. While it is set no further
//! chunks are decoded, so audio after the endpoint waits in the buffer for
//! the next utterance instead of merging into this one.

use crate::audio::calculate_rms;
use crate::defaults;
use crate::error::{Result, VoxError};
use crate::recognizer::{RecognizerConfig, StreamingRecognizer, check_sample_rate};
use crate::stt::Transcriber;

/// Decoding state of one session.
#[derive(Debug, Default)]
pub struct ChunkedStream {
    pending: Vec<f32>,
    utterance: Vec<f32>,
    utterance_samples: usize,
    trailing_silence_samples: usize,
    contains_nonsilence: bool,
    text: String,
    endpoint: bool,
    /// Utterance length at the last transcriber call.
    transcribed_samples: usize,
    /// Speech arrived after the last transcriber call.
    stale: bool,
}

impl ChunkedStream {
    /// Samples buffered but not yet decoded.
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }
}

pub struct TranscriberRecognizer<T> {
    transcriber: T,
    config: RecognizerConfig,
    chunk_samples: usize,
    refresh_samples: usize,
    silence_threshold: f32,
}

impl<T: Transcriber> TranscriberRecognizer<T> {
    pub fn new(transcriber: T, config: RecognizerConfig) -> Self {
        let chunk_samples = ms_to_samples(config.feature.sample_rate, defaults::DECODE_CHUNK_MS);
        let refresh_samples =
            ms_to_samples(config.feature.sample_rate, defaults::HYPOTHESIS_REFRESH_MS);
        Self {
            transcriber,
            config,
            chunk_samples,
            refresh_samples,
            silence_threshold: defaults::SILENCE_THRESHOLD,
        }
    }

    /// RMS level at or below which a chunk counts as silence.
    pub fn with_silence_threshold(mut self, threshold: f32) -> Self {
        self.silence_threshold = threshold;
        self
    }

    pub fn with_chunk_ms(mut self, chunk_ms: u32) -> Self {
        self.chunk_samples = ms_to_samples(self.config.feature.sample_rate, chunk_ms);
        self
    }

    /// New utterance audio required before continuous speech triggers
    /// another transcriber call.
    pub fn with_refresh_ms(mut self, refresh_ms: u32) -> Self {
        self.refresh_samples = ms_to_samples(self.config.feature.sample_rate, refresh_ms);
        self
    }

    pub fn transcriber(&self) -> &T {
        &self.transcriber
    }

    fn seconds(&self, samples: usize) -> f32 {
        samples as f32 / self.config.feature.sample_rate as f32
    }

    fn refresh(&self, stream: &mut ChunkedStream) -> Result<()> {
        stream.text = self.transcriber.transcribe(&stream.utterance)?.trim().to_string();
        stream.transcribed_samples = stream.utterance.len();
        stream.stale = false;
        Ok(())
    }
}

fn ms_to_samples(sample_rate: u32, ms: u32) -> usize {
    (sample_rate as usize * ms as usize / 1000).max(1)
}

impl<T: Transcriber> StreamingRecognizer for TranscriberRecognizer<T> {
    type Stream = ChunkedStream;

    fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    fn create_stream(&self) -> Result<ChunkedStream> {
        if !self.transcriber.is_ready() {
            return Err(VoxError::configuration(format!(
                "model '{}' is not loaded",
                self.transcriber.model_name()
            )));
        }
        Ok(ChunkedStream::default())
    }

    fn accept_waveform(
        &self,
        stream: &mut ChunkedStream,
        sample_rate: u32,
        samples: &[f32],
    ) -> Result<()> {
        check_sample_rate(&self.config, sample_rate)?;
        stream.pending.extend_from_slice(samples);
        Ok(())
    }

    fn is_ready(&self, stream: &ChunkedStream) -> bool {
        !stream.endpoint && stream.pending.len() >= self.chunk_samples
    }

    fn decode(&self, stream: &mut ChunkedStream) -> Result<()> {
        if !self.is_ready(stream) {
            return Ok(());
        }
        let chunk: Vec<f32> = stream.pending.drain(..self.chunk_samples).collect();
        stream.utterance_samples += chunk.len();

        if calculate_rms(&chunk) > self.silence_threshold {
            let first = !stream.contains_nonsilence;
            stream.contains_nonsilence = true;
            stream.trailing_silence_samples = 0;
            stream.utterance.extend_from_slice(&chunk);
            stream.stale = true;
            let untranscribed = stream.utterance.len() - stream.transcribed_samples;
            if first || untranscribed >= self.refresh_samples {
                self.refresh(stream)?;
            }
        } else {
            stream.trailing_silence_samples += chunk.len();
            // Pauses inside an utterance stay in the audio the model sees.
            if stream.contains_nonsilence {
                stream.utterance.extend_from_slice(&chunk);
            }
            if stream.stale {
                self.refresh(stream)?;
            }
        }

        stream.endpoint = self.config.endpoint.detect(
            stream.contains_nonsilence,
            self.seconds(stream.trailing_silence_samples),
            self.seconds(stream.utterance_samples),
        );
        if stream.endpoint && stream.stale {
            self.refresh(stream)?;
        }
        Ok(())
    }

    fn is_endpoint(&self, stream: &ChunkedStream) -> bool {
        stream.endpoint
    }

    fn get_result(&self, stream: &ChunkedStream) -> String {
        stream.text.clone()
    }

    fn reset(&self, stream: &mut ChunkedStream) {
        stream.utterance.clear();
        stream.utterance_samples = 0;
        stream.trailing_silence_samples = 0;
        stream.contains_nonsilence = false;
        stream.text.clear();
        stream.endpoint = false;
        stream.transcribed_samples = 0;
        stream.stale = false;
    }

    fn free(self) {
        log::debug!("Released model '{}'", self.transcriber.model_name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stt::MockTranscriber;

    fn recognizer(transcriber: MockTranscriber) -> TranscriberRecognizer<MockTranscriber> {
        TranscriberRecognizer::new(transcriber, RecognizerConfig::default())
    }

    fn feed(
        r: &TranscriberRecognizer<MockTranscriber>,
        s: &mut ChunkedStream,
        value: f32,
        secs: f32,
    ) {
        let n = (secs * 16000.0) as usize;
        r.accept_waveform(s, 16000, &vec![value; n]).unwrap();
        while r.is_ready(s) {
            r.decode(s).unwrap();
        }
    }

    #[test]
    fn test_speech_then_short_silence_is_not_an_endpoint() {
        let r = recognizer(MockTranscriber::new("m").with_response(" hello "));
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 0.5);
        assert_eq!(r.get_result(&s), "hello");
        feed(&r, &mut s, 0.0, 1.0);
        assert!(!r.is_endpoint(&s));
    }

    #[test]
    fn test_rule2_endpoint_after_speech() {
        let r = recognizer(MockTranscriber::new("m").with_response("hello"));
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 0.5);
        feed(&r, &mut s, 0.0, 1.2);
        assert!(r.is_endpoint(&s));
        assert_eq!(r.get_result(&s), "hello");
    }

    #[test]
    fn test_rule1_endpoint_on_pure_silence() {
        let transcriber = MockTranscriber::new("m");
        let r = recognizer(transcriber.clone());
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.0, 2.3);
        assert!(!r.is_endpoint(&s));
        feed(&r, &mut s, 0.0, 0.2);
        assert!(r.is_endpoint(&s));
        assert_eq!(r.get_result(&s), "");
        assert_eq!(transcriber.call_count(), 0);
    }

    #[test]
    fn test_rule3_endpoint_on_long_utterance() {
        let r = recognizer(MockTranscriber::new("m").with_response("talk"));
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 19.9);
        assert!(!r.is_endpoint(&s));
        feed(&r, &mut s, 0.5, 0.2);
        assert!(r.is_endpoint(&s));
    }

    #[test]
    fn test_silence_does_not_retranscribe() {
        let transcriber = MockTranscriber::new("m");
        let r = recognizer(transcriber.clone());
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 0.3);
        assert_eq!(transcriber.call_count(), 1);
        // One refresh on the speech-to-silence edge, then nothing
        feed(&r, &mut s, 0.0, 0.5);
        assert_eq!(transcriber.call_count(), 2);
        feed(&r, &mut s, 0.0, 0.5);
        assert_eq!(transcriber.call_count(), 2);
    }

    #[test]
    fn test_continuous_speech_refreshes_once_per_interval() {
        let transcriber = MockTranscriber::new("m").with_response("words");
        let r = recognizer(transcriber.clone());
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 10.0);
        // First chunk plus one pass per second of new audio
        assert_eq!(transcriber.call_count(), 10);
        assert_eq!(r.get_result(&s), "words");

        feed(&r, &mut s, 0.0, 1.2);
        assert!(r.is_endpoint(&s));
        assert_eq!(transcriber.call_count(), 11);
    }

    #[test]
    fn test_custom_refresh_interval() {
        let transcriber = MockTranscriber::new("m");
        let r = recognizer(transcriber.clone()).with_refresh_ms(500);
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 2.0);
        assert_eq!(transcriber.call_count(), 4);
    }

    #[test]
    fn test_rule3_endpoint_refreshes_stale_hypothesis() {
        let transcriber = MockTranscriber::new("m");
        let r = recognizer(transcriber.clone()).with_refresh_ms(60_000);
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 19.9);
        assert_eq!(transcriber.call_count(), 1);
        feed(&r, &mut s, 0.5, 0.2);
        assert!(r.is_endpoint(&s));
        assert_eq!(transcriber.call_count(), 2);
    }

    #[test]
    fn test_endpoint_latches_until_reset() {
        let r = recognizer(MockTranscriber::new("m").with_response("one"));
        let mut s = r.create_stream().unwrap();
        // Speech, an endpointing pause and the next utterance in one buffer
        let mut audio = vec![0.5; 8000];
        audio.extend(vec![0.0; 19200]);
        audio.extend(vec![0.5; 8000]);
        r.accept_waveform(&mut s, 16000, &audio).unwrap();
        while r.is_ready(&s) {
            r.decode(&mut s).unwrap();
        }

        assert!(r.is_endpoint(&s));
        assert_eq!(s.pending_samples(), 8000);
        r.decode(&mut s).unwrap();
        assert_eq!(s.pending_samples(), 8000);

        r.reset(&mut s);
        assert!(!r.is_endpoint(&s));
        assert!(r.is_ready(&s));
        while r.is_ready(&s) {
            r.decode(&mut s).unwrap();
        }
        assert!(!r.is_endpoint(&s));
        assert_eq!(r.get_result(&s), "one");
    }

    #[test]
    fn test_reset_clears_utterance_but_keeps_pending() {
        let r = recognizer(MockTranscriber::new("m").with_response("x"));
        let mut s = r.create_stream().unwrap();
        feed(&r, &mut s, 0.5, 0.2);
        r.accept_waveform(&mut s, 16000, &[0.5; 100]).unwrap();

        r.reset(&mut s);
        assert_eq!(r.get_result(&s), "");
        assert!(!r.is_endpoint(&s));
        assert_eq!(s.pending_samples(), 100);

        r.reset(&mut s);
        assert_eq!(r.get_result(&s), "");
    }

    #[test]
    fn test_transcriber_failure_propagates() {
        let r = recognizer(MockTranscriber::new("m").with_failure());
        let mut s = r.create_stream().unwrap();
        r.accept_waveform(&mut s, 16000, &[0.5; 1600]).unwrap();
        assert!(matches!(r.decode(&mut s), Err(VoxError::Recognition { .. })));
    }

    #[test]
    fn test_unloaded_model_cannot_create_stream() {
        let r = recognizer(MockTranscriber::new("m").unloaded());
        assert!(matches!(
            r.create_stream(),
            Err(VoxError::Configuration { .. })
        ));
    }

    #[test]
    fn test_rate_mismatch_is_configuration_error() {
        let r = recognizer(MockTranscriber::new("m"));
        let mut s = r.create_stream().unwrap();
        let err = r.accept_waveform(&mut s, 44100, &[0.0; 10]).unwrap_err();
        assert!(matches!(err, VoxError::Configuration { .. }));
    }

    #[test]
    fn test_custom_chunk_and_threshold() {
        let r = recognizer(MockTranscriber::new("m"))
            .with_chunk_ms(50)
            .with_silence_threshold(0.6);
        let mut s = r.create_stream().unwrap();
        r.accept_waveform(&mut s, 16000, &[0.5; 800]).unwrap();
        assert!(r.is_ready(&s));
        r.decode(&mut s).unwrap();
        // 0.5 is below the raised threshold, so it counts as silence
        assert_eq!(r.transcriber().call_count(), 0);
    }
}

use crate::error::{Result, VoxError};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Batch speech-to-text over one buffered utterance.
///
/// This trait allows swapping implementations (real Whisper vs mock). The
/// streaming adapter in `recognizer::chunked` turns any transcriber into a
/// `StreamingRecognizer`.
pub trait Transcriber: Send + Sync {
    /// Transcribe normalized mono samples at the recognizer's sample rate.
    fn transcribe(&self, audio: &[f32]) -> Result<String>;

    /// Get the name of the loaded model
    fn model_name(&self) -> &str;

    /// Check if the transcriber is ready
    fn is_ready(&self) -> bool;
}

/// Implement Transcriber for Arc<T> to allow sharing across sessions.
impl<T: Transcriber> Transcriber for Arc<T> {
    fn transcribe(&self, audio: &[f32]) -> Result<String> {
        (**self).transcribe(audio)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }
}

/// Mock transcriber for testing
#[derive(Debug, Clone)]
pub struct MockTranscriber {
    model_name: String,
    response: String,
    should_fail: bool,
    unloaded: bool,
    calls: Arc<AtomicUsize>,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            response: "mock transcription".to_string(),
            should_fail: false,
            unloaded: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific response
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail on transcribe
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Report the model as not loaded.
    pub fn unloaded(mut self) -> Self {
        self.unloaded = true;
        self
    }

    /// Number of `transcribe` calls so far, shared across clones.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, _audio: &[f32]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            Err(VoxError::Recognition {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        !self.unloaded
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transcriber_returns_response() {
        let transcriber = MockTranscriber::new("test-model").with_response("Hello, this is a test");
        let result = transcriber.transcribe(&[0.0; 1000]);
        assert_eq!(result.unwrap(), "Hello, this is a test");
        assert_eq!(transcriber.call_count(), 1);
    }

    #[test]
    fn test_mock_transcriber_returns_error_when_configured() {
        let transcriber = MockTranscriber::new("test-model").with_failure();
        match transcriber.transcribe(&[0.0; 1000]) {
            Err(VoxError::Recognition { message }) => {
                assert_eq!(message, "mock transcription failure");
            }
            _ => panic!("Expected Recognition error"),
        }
        // A failing model is still loaded.
        assert!(transcriber.is_ready());
    }

    #[test]
    fn test_mock_transcriber_unloaded() {
        assert!(MockTranscriber::new("m").is_ready());
        assert!(!MockTranscriber::new("m").unloaded().is_ready());
    }

    #[test]
    fn test_call_count_is_shared_by_clones() {
        let transcriber = MockTranscriber::new("m");
        let clone = transcriber.clone();
        clone.transcribe(&[]).unwrap();
        clone.transcribe(&[]).unwrap();
        assert_eq!(transcriber.call_count(), 2);
    }

    #[test]
    fn test_transcriber_trait_is_object_safe() {
        let transcriber: Box<dyn Transcriber> =
            Box::new(MockTranscriber::new("test-model").with_response("boxed test"));
        assert_eq!(transcriber.model_name(), "test-model");
        assert_eq!(transcriber.transcribe(&[0.0; 100]).unwrap(), "boxed test");
    }

    #[test]
    fn test_arc_transcriber_delegates() {
        let transcriber = Arc::new(MockTranscriber::new("shared").with_response("hi"));
        assert_eq!(Transcriber::model_name(&transcriber), "shared");
        assert_eq!(transcriber.transcribe(&[]).unwrap(), "hi");
    }
}

//! Recognition session: binds one audio source to one recognizer.
//!
//! Per frame the session feeds the stream, drains every ready decode step,
//! then reads the hypothesis and the endpoint flag. A changed hypothesis is
//! published as `Partial`; an endpoint publishes `Final` (when there is
//! text), advances the segment counter and resets the stream.
//!
//! The recognizer and its stream live in `Option<Resources>`. `None` means
//! closed; every recognizer call goes through an accessor that fails with
//! `ResourceClosed` instead of touching released state. Shutdown takes the
//! resources out, so they are freed exactly once however many times it runs.

mod decode;
mod handle;

pub use decode::{decode_file, decode_source};
pub use handle::{SessionHandle, StopHandle};

use crate::audio::{AudioFormat, AudioFrame, AudioSource, SourceEvent};
use crate::defaults;
use crate::error::{Result, VoxError};
use crate::recognizer::{RecognizerConfig, RecognizerFactory, StreamingRecognizer};
use crate::sink::{RecognitionEvent, ResultSink};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Lifecycle of a session: `Idle → Listening → Terminating → Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Listening,
    Terminating,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Terminating => write!(f, "terminating"),
        }
    }
}

/// Deduplication and numbering state of the current transcript.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptState {
    pub last_emitted_text: String,
    /// Number of non-empty segments finalized so far.
    pub segment_index: u32,
}

/// Outcome of one listening run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub segments: u32,
    pub frames: u64,
    /// What the sink returned from `finish`.
    pub transcript: Option<String>,
}

struct Resources<R: StreamingRecognizer> {
    recognizer: R,
    stream: R::Stream,
}

fn open<R: StreamingRecognizer>(resources: &mut Option<Resources<R>>) -> Result<&mut Resources<R>> {
    resources.as_mut().ok_or_else(|| VoxError::ResourceClosed {
        resource: "recognizer stream".to_string(),
    })
}

pub struct RecognitionSession<F: RecognizerFactory> {
    factory: F,
    config: RecognizerConfig,
    sink: Box<dyn ResultSink>,
    state: SessionState,
    transcript: TranscriptState,
    resources: Option<Resources<F::Recognizer>>,
    source: Option<Box<dyn AudioSource>>,
    events: Option<Receiver<SourceEvent>>,
    stop: Arc<AtomicBool>,
    frames: u64,
    finished_transcript: Option<String>,
}

impl<F: RecognizerFactory> RecognitionSession<F> {
    /// Create an idle session. The config is validated here, so a bad
    /// config never reaches the factory.
    pub fn new(config: RecognizerConfig, factory: F, sink: impl ResultSink) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            factory,
            config,
            sink: Box::new(sink),
            state: SessionState::Idle,
            transcript: TranscriptState::default(),
            resources: None,
            source: None,
            events: None,
            stop: Arc::new(AtomicBool::new(false)),
            frames: 0,
            finished_transcript: None,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &TranscriptState {
        &self.transcript
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Flag that makes `run` return after the frame in flight.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.stop))
    }

    fn expected_format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.config.feature.sample_rate,
            channels: defaults::CHANNELS,
        }
    }

    /// Acquire recognizer, stream and source subscription.
    ///
    /// Only valid while `Idle`. On any failure everything acquired so far is
    /// released and the session stays `Idle`.
    pub fn start(&mut self, mut source: Box<dyn AudioSource>) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(VoxError::SessionState {
                message: format!("cannot start while {}", self.state),
            });
        }

        let expected = self.expected_format();
        if source.format() != expected {
            return Err(VoxError::configuration(format!(
                "{} source delivers {}, recognizer requires {}",
                source.name(),
                source.format(),
                expected
            )));
        }

        let recognizer = self.factory.build(&self.config)?;
        let stream = match recognizer.create_stream() {
            Ok(stream) => stream,
            Err(e) => {
                recognizer.free();
                return Err(e);
            }
        };
        let events = match source.subscribe() {
            Ok(rx) => rx,
            Err(e) => {
                recognizer.free_stream(stream);
                recognizer.free();
                return Err(e);
            }
        };

        self.transcript = TranscriptState::default();
        self.frames = 0;
        self.finished_transcript = None;
        self.stop.store(false, Ordering::SeqCst);
        self.resources = Some(Resources { recognizer, stream });
        log::info!("Session listening on {} source ({})", source.name(), expected);
        self.source = Some(source);
        self.events = Some(events);
        self.state = SessionState::Listening;
        Ok(())
    }

    /// Process one frame. Any error shuts the session down before it is
    /// returned.
    pub fn feed(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.state != SessionState::Listening {
            return Err(VoxError::SessionState {
                message: format!("cannot process frames while {}", self.state),
            });
        }
        match self.process_frame(frame) {
            Ok(()) => Ok(()),
            Err(e) => self.fail(e),
        }
    }

    fn process_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        let expected = self.expected_format();
        if frame.format != expected {
            return Err(VoxError::configuration(format!(
                "frame {} is {}, session runs at {}",
                frame.sequence, frame.format, expected
            )));
        }

        let samples = frame.to_normalized();
        let Resources { recognizer, stream } = open(&mut self.resources)?;
        recognizer.accept_waveform(stream, frame.format.sample_rate, &samples)?;
        while recognizer.is_ready(stream) {
            recognizer.decode(stream)?;
        }
        self.frames += 1;
        self.publish(false)
    }

    /// Read the hypothesis and endpoint, emit events, reset on endpoint.
    fn publish(&mut self, force_endpoint: bool) -> Result<()> {
        let Resources { recognizer, stream } = open(&mut self.resources)?;
        let endpoint = force_endpoint || recognizer.is_endpoint(stream);
        let text = recognizer.get_result(stream);
        let segment_index = self.transcript.segment_index;

        if !text.is_empty() && text != self.transcript.last_emitted_text {
            self.transcript.last_emitted_text = text.clone();
            self.sink.handle(&RecognitionEvent::Partial {
                segment_index,
                text: text.clone(),
            })?;
        }

        if endpoint {
            if !text.is_empty() {
                log::debug!("Segment {} final: {}", segment_index, text);
                self.transcript.last_emitted_text = text.clone();
                self.sink
                    .handle(&RecognitionEvent::Final { segment_index, text })?;
                self.transcript.segment_index += 1;
            }
            recognizer.reset(stream);
        }
        Ok(())
    }

    /// Consume source events until stop, completion or failure, then shut
    /// down.
    ///
    /// `Finished` finalizes the segment in flight. A source that hangs up
    /// without `Finished` ends the run without finalizing.
    pub fn run(&mut self) -> Result<SessionSummary> {
        if self.state != SessionState::Listening {
            return Err(VoxError::SessionState {
                message: format!("cannot run while {}", self.state),
            });
        }
        let Some(events) = self.events.clone() else {
            return self.fail(VoxError::ResourceClosed {
                resource: "source subscription".to_string(),
            });
        };
        let poll = Duration::from_millis(defaults::SOURCE_POLL_MS);

        loop {
            if self.stop.load(Ordering::SeqCst) {
                log::debug!("Session stop requested");
                break;
            }
            match events.recv_timeout(poll) {
                Ok(SourceEvent::Frame(frame)) => {
                    if let Err(e) = self.process_frame(&frame) {
                        return self.fail(e);
                    }
                }
                Ok(SourceEvent::Finished) => {
                    if let Err(e) = self.publish(true) {
                        return self.fail(e);
                    }
                    break;
                }
                Ok(SourceEvent::Failed(e)) => {
                    log::error!("Audio source failed: {}", e);
                    return self.fail(e);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("Audio source hung up without finishing");
                    break;
                }
            }
        }

        self.shutdown()?;
        Ok(self.summary())
    }

    fn fail<T>(&mut self, error: VoxError) -> Result<T> {
        if let Err(cleanup) = self.shutdown() {
            log::warn!("Cleanup after failure also failed: {}", cleanup);
        }
        Err(error)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            segments: self.transcript.segment_index,
            frames: self.frames,
            transcript: self.finished_transcript.clone(),
        }
    }

    /// Release the source, the stream and the recognizer, then finish the
    /// sink. Idempotent: once idle, further calls do nothing.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::Idle {
            return Ok(());
        }
        self.state = SessionState::Terminating;
        self.stop.store(true, Ordering::SeqCst);

        let mut result = Ok(());
        if let Some(mut source) = self.source.take()
            && let Err(e) = source.unsubscribe()
        {
            log::warn!("Failed to unsubscribe from {}: {}", source.name(), e);
            result = Err(e);
        }
        self.events = None;

        if let Some(Resources { recognizer, stream }) = self.resources.take() {
            recognizer.free_stream(stream);
            recognizer.free();
        }

        self.finished_transcript = self.sink.finish();
        log::info!(
            "Session stopped: {} segment(s), {} frame(s)",
            self.transcript.segment_index,
            self.frames
        );
        self.state = SessionState::Idle;
        result
    }
}

impl<F> RecognitionSession<F>
where
    F: RecognizerFactory + 'static,
    F::Recognizer: 'static,
{
    /// Run the session on a worker thread. Must be listening.
    pub fn spawn(self) -> Result<SessionHandle> {
        if self.state != SessionState::Listening {
            return Err(VoxError::SessionState {
                message: format!("cannot spawn while {}", self.state),
            });
        }
        let stop = self.stop_handle();
        let mut session = self;
        let thread = std::thread::Builder::new()
            .name("voxdesk-session".to_string())
            .spawn(move || session.run())?;
        Ok(SessionHandle::new(stop, thread))
    }
}

impl<F: RecognizerFactory> Drop for RecognitionSession<F> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("Session shutdown on drop failed: {}", e);
        }
    }
}

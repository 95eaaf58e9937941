use crate::audio::frame::{AudioFormat, AudioFrame};
use crate::error::{Result, VoxError};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Event delivered by an audio source to its single subscriber.
#[derive(Debug)]
pub enum SourceEvent {
    /// The next frame, in capture order.
    Frame(AudioFrame),
    /// A finite source has delivered its last frame.
    Finished,
    /// Capture failed. No further events follow.
    Failed(VoxError),
}

/// Producer of audio frames.
///
/// This trait allows swapping implementations (live device, WAV file, replay).
/// A source delivers frames to at most one subscriber, in order, without
/// duplication. After `unsubscribe` returns, no further frames are produced.
pub trait AudioSource: Send {
    /// Format every frame from this source will carry.
    fn format(&self) -> AudioFormat;

    /// Start delivering events. Calling this twice without an `unsubscribe`
    /// in between is an error.
    fn subscribe(&mut self) -> Result<Receiver<SourceEvent>>;

    /// Stop delivering events. Idempotent.
    fn unsubscribe(&mut self) -> Result<()>;

    /// True for sources that end on their own (files).
    fn is_finite(&self) -> bool {
        false
    }

    /// Short name used in log lines.
    fn name(&self) -> &'static str;
}

/// Counters shared between a `ReplaySource` and the test that owns it.
#[derive(Debug, Default)]
pub struct ReplayCounters {
    pub subscribes: AtomicUsize,
    pub unsubscribes: AtomicUsize,
}

impl ReplayCounters {
    pub fn subscribes(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub fn unsubscribes(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }
}

/// Source that replays a fixed list of frames.
///
/// Used by tests and benchmarks in place of a microphone.
#[derive(Debug)]
pub struct ReplaySource {
    format: AudioFormat,
    frames: Vec<AudioFrame>,
    finite: bool,
    failure: Option<(usize, String)>,
    subscribed: bool,
    live: Option<Sender<SourceEvent>>,
    counters: Arc<ReplayCounters>,
}

impl ReplaySource {
    /// Replay the given frames, then report `Finished`.
    pub fn new(format: AudioFormat, frames: Vec<AudioFrame>) -> Self {
        Self {
            format,
            frames,
            finite: true,
            failure: None,
            subscribed: false,
            live: None,
            counters: Arc::new(ReplayCounters::default()),
        }
    }

    /// Build frames from raw `i16` chunks at the given format.
    pub fn from_i16_chunks(format: AudioFormat, chunks: Vec<Vec<i16>>) -> Self {
        let frames = chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| AudioFrame::from_i16(i as u64, format, chunk))
            .collect();
        Self::new(format, frames)
    }

    /// Behave like a live device: never report `Finished` and keep the
    /// channel open until unsubscribed.
    pub fn without_completion(mut self) -> Self {
        self.finite = false;
        self
    }

    /// Report a device failure after `frames` frames were delivered.
    pub fn with_failure_after(mut self, frames: usize, message: &str) -> Self {
        self.failure = Some((frames, message.to_string()));
        self
    }

    /// Shared view of subscribe/unsubscribe counts.
    pub fn counters(&self) -> Arc<ReplayCounters> {
        Arc::clone(&self.counters)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

impl AudioSource for ReplaySource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn subscribe(&mut self) -> Result<Receiver<SourceEvent>> {
        if self.subscribed {
            return Err(VoxError::Device {
                message: "replay source already has a subscriber".to_string(),
            });
        }
        self.counters.subscribes.fetch_add(1, Ordering::SeqCst);

        let (tx, rx) = unbounded();
        let limit = self
            .failure
            .as_ref()
            .map_or(self.frames.len(), |(n, _)| (*n).min(self.frames.len()));
        for frame in &self.frames[..limit] {
            // The receiver is held locally, so sends cannot fail here.
            let _ = tx.send(SourceEvent::Frame(frame.clone()));
        }
        if let Some((_, message)) = &self.failure {
            let _ = tx.send(SourceEvent::Failed(VoxError::Device {
                message: message.clone(),
            }));
        } else if self.finite {
            let _ = tx.send(SourceEvent::Finished);
        }

        // An endless source keeps its sender so the channel stays open.
        if !self.finite && self.failure.is_none() {
            self.live = Some(tx);
        }
        self.subscribed = true;
        Ok(rx)
    }

    fn unsubscribe(&mut self) -> Result<()> {
        self.live = None;
        if std::mem::take(&mut self.subscribed) {
            self.counters.unsubscribes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_finite(&self) -> bool {
        self.finite
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunks() -> Vec<Vec<i16>> {
        vec![vec![1, 2], vec![3, 4], vec![5, 6]]
    }

    fn drain(rx: &Receiver<SourceEvent>) -> Vec<SourceEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn test_replay_delivers_frames_in_order_then_finishes() {
        let mut source = ReplaySource::from_i16_chunks(AudioFormat::mono(16000), chunks());
        let rx = source.subscribe().unwrap();
        let events = drain(&rx);

        assert_eq!(events.len(), 4);
        for (i, event) in events[..3].iter().enumerate() {
            match event {
                SourceEvent::Frame(frame) => assert_eq!(frame.sequence, i as u64),
                other => panic!("Expected frame, got {other:?}"),
            }
        }
        assert!(matches!(events[3], SourceEvent::Finished));
        assert!(source.is_finite());
    }

    #[test]
    fn test_replay_without_completion_keeps_channel_open() {
        let mut source =
            ReplaySource::from_i16_chunks(AudioFormat::mono(16000), chunks()).without_completion();
        let rx = source.subscribe().unwrap();
        assert_eq!(drain(&rx).len(), 3);
        assert!(matches!(
            rx.try_recv(),
            Err(crossbeam_channel::TryRecvError::Empty)
        ));
        assert!(!source.is_finite());

        source.unsubscribe().unwrap();
        assert!(rx.recv().is_err());
    }

    #[test]
    fn test_replay_failure_after_frames() {
        let mut source = ReplaySource::from_i16_chunks(AudioFormat::mono(16000), chunks())
            .with_failure_after(1, "unplugged");
        let rx = source.subscribe().unwrap();
        let events = drain(&rx);

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], SourceEvent::Frame(_)));
        match &events[1] {
            SourceEvent::Failed(VoxError::Device { message }) => assert_eq!(message, "unplugged"),
            other => panic!("Expected device failure, got {other:?}"),
        }
    }

    #[test]
    fn test_replay_rejects_second_subscriber() {
        let mut source = ReplaySource::from_i16_chunks(AudioFormat::mono(16000), chunks());
        let _rx = source.subscribe().unwrap();
        assert!(source.subscribe().is_err());

        source.unsubscribe().unwrap();
        assert!(source.subscribe().is_ok());
        assert_eq!(source.counters().subscribes(), 2);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let mut source = ReplaySource::from_i16_chunks(AudioFormat::mono(16000), chunks());
        let counters = source.counters();
        let _rx = source.subscribe().unwrap();

        source.unsubscribe().unwrap();
        source.unsubscribe().unwrap();

        assert_eq!(counters.unsubscribes(), 1);
        assert!(!source.is_subscribed());
    }

    #[test]
    fn test_audio_source_trait_is_object_safe() {
        let mut source: Box<dyn AudioSource> = Box::new(ReplaySource::from_i16_chunks(
            AudioFormat::mono(8000),
            chunks(),
        ));
        assert_eq!(source.format().sample_rate, 8000);
        assert_eq!(source.name(), "replay");
        let rx = source.subscribe().unwrap();
        assert_eq!(rx.try_iter().count(), 4);
    }
}

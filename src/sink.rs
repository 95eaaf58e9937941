//! Consumers of transcript events.

use crate::error::{Result, VoxError};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

/// Transcript update emitted by a recognition session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecognitionEvent {
    /// The hypothesis for the current segment changed.
    Partial { segment_index: u32, text: String },
    /// The segment ended; `text` is its final transcript.
    Final { segment_index: u32, text: String },
}

impl RecognitionEvent {
    pub fn segment_index(&self) -> u32 {
        match self {
            Self::Partial { segment_index, .. } | Self::Final { segment_index, .. } => {
                *segment_index
            }
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Partial { text, .. } | Self::Final { text, .. } => text,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

/// Pluggable transcript output.
/// Pairs with AudioSource for input; a session pushes every event here.
pub trait ResultSink: Send + 'static {
    fn handle(&mut self, event: &RecognitionEvent) -> Result<()>;

    /// Called once when the session shuts down. Return accumulated text if
    /// applicable.
    fn finish(&mut self) -> Option<String> {
        None
    }

    /// Name for logging/debugging.
    fn name(&self) -> &'static str {
        "sink"
    }
}

/// Logs partials at debug and finals at info.
#[derive(Debug, Default)]
pub struct LogSink;

impl ResultSink for LogSink {
    fn handle(&mut self, event: &RecognitionEvent) -> Result<()> {
        match event {
            RecognitionEvent::Partial {
                segment_index,
                text,
            } => log::debug!("[{}] {}", segment_index, text),
            RecognitionEvent::Final {
                segment_index,
                text,
            } => log::info!("[{}] final: {}", segment_index, text),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Prints finals to stdout as `<segment> <text>`; partials go to stderr
/// unless quiet.
#[derive(Debug, Default)]
pub struct StdoutSink {
    quiet: bool,
}

impl StdoutSink {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }
}

impl ResultSink for StdoutSink {
    fn handle(&mut self, event: &RecognitionEvent) -> Result<()> {
        match event {
            RecognitionEvent::Partial {
                segment_index,
                text,
            } => {
                if !self.quiet {
                    eprint!("\r\x1b[2K{} {}", segment_index, text);
                    std::io::stderr().flush()?;
                }
            }
            RecognitionEvent::Final {
                segment_index,
                text,
            } => {
                if !self.quiet {
                    eprint!("\r\x1b[2K");
                }
                let mut stdout = std::io::stdout().lock();
                writeln!(stdout, "{} {}", segment_index, text)?;
                stdout.flush()?;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdout"
    }
}

/// Collects every event; `finish` joins the final texts with spaces.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    events: Arc<Mutex<Vec<RecognitionEvent>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events received so far, shared across clones.
    pub fn events(&self) -> Vec<RecognitionEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn finals(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(RecognitionEvent::is_final)
            .map(|e| e.text().to_string())
            .collect()
    }

    pub fn partials(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| !e.is_final())
            .map(|e| e.text().to_string())
            .collect()
    }
}

impl ResultSink for CollectorSink {
    fn handle(&mut self, event: &RecognitionEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
        Ok(())
    }

    fn finish(&mut self) -> Option<String> {
        let finals = self.finals();
        if finals.is_empty() {
            None
        } else {
            Some(finals.join(" "))
        }
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}

/// Forwards events over a crossbeam channel.
///
/// Partials are best effort: a full channel drops them, since the next
/// partial or the final supersedes them. Finals block until the receiver
/// makes room. A closed channel is an error for either kind, which ends the
/// session.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<RecognitionEvent>,
}

impl ChannelSink {
    pub fn new(tx: Sender<RecognitionEvent>) -> Self {
        Self { tx }
    }
}

fn receiver_dropped() -> VoxError {
    VoxError::ResourceClosed {
        resource: "result channel".to_string(),
    }
}

impl ResultSink for ChannelSink {
    fn handle(&mut self, event: &RecognitionEvent) -> Result<()> {
        if event.is_final() {
            return self.tx.send(event.clone()).map_err(|_| receiver_dropped());
        }
        match self.tx.try_send(event.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                log::debug!(
                    "Result channel full, dropping partial for segment {}",
                    event.segment_index()
                );
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(receiver_dropped()),
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partial(i: u32, text: &str) -> RecognitionEvent {
        RecognitionEvent::Partial {
            segment_index: i,
            text: text.to_string(),
        }
    }

    fn final_(i: u32, text: &str) -> RecognitionEvent {
        RecognitionEvent::Final {
            segment_index: i,
            text: text.to_string(),
        }
    }

    #[test]
    fn result_sink_is_object_safe() {
        let _: Box<dyn ResultSink> = Box::new(CollectorSink::new());
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_string(&partial(2, "hi")).unwrap();
        assert_eq!(json, r#"{"type":"partial","segment_index":2,"text":"hi"}"#);
        let back: RecognitionEvent =
            serde_json::from_str(r#"{"type":"final","segment_index":0,"text":"ok"}"#).unwrap();
        assert_eq!(back, final_(0, "ok"));
    }

    #[test]
    fn event_accessors() {
        let e = final_(3, "done");
        assert_eq!(e.segment_index(), 3);
        assert_eq!(e.text(), "done");
        assert!(e.is_final());
        assert!(!partial(0, "x").is_final());
    }

    #[test]
    fn collector_sink_joins_finals() {
        let mut sink = CollectorSink::new();
        let view = sink.clone();
        sink.handle(&partial(0, "hel")).unwrap();
        sink.handle(&final_(0, "hello")).unwrap();
        sink.handle(&final_(1, "world")).unwrap();

        assert_eq!(view.events().len(), 3);
        assert_eq!(view.partials(), vec!["hel"]);
        assert_eq!(sink.finish(), Some("hello world".to_string()));
    }

    #[test]
    fn collector_sink_without_finals_returns_none() {
        let mut sink = CollectorSink::new();
        sink.handle(&partial(0, "x")).unwrap();
        assert_eq!(sink.finish(), None);
    }

    #[test]
    fn channel_sink_drops_partials_when_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.handle(&partial(0, "a")).unwrap();
        sink.handle(&partial(0, "b")).unwrap();
        assert_eq!(rx.try_recv().unwrap(), partial(0, "a"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_final_waits_for_room() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.handle(&partial(0, "a")).unwrap();

        let reader = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            rx.iter().take(2).collect::<Vec<_>>()
        });
        sink.handle(&final_(0, "a b")).unwrap();

        assert_eq!(
            reader.join().unwrap(),
            vec![partial(0, "a"), final_(0, "a b")]
        );
    }

    #[test]
    fn channel_sink_errors_when_receiver_dropped() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(rx);
        let mut sink = ChannelSink::new(tx);
        assert!(matches!(
            sink.handle(&final_(0, "a")),
            Err(VoxError::ResourceClosed { .. })
        ));
        assert!(sink.handle(&partial(0, "a")).is_err());
    }

    #[test]
    fn channel_sink_final_fails_when_receiver_drops_while_full() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut sink = ChannelSink::new(tx);
        sink.handle(&partial(0, "a")).unwrap();

        let reader = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(50));
            drop(rx);
        });
        assert!(sink.handle(&final_(0, "a b")).is_err());
        reader.join().unwrap();
    }

    #[test]
    fn log_sink_accepts_everything() {
        let mut sink = LogSink;
        sink.handle(&partial(0, "a")).unwrap();
        sink.handle(&final_(0, "a")).unwrap();
        assert_eq!(sink.finish(), None);
        assert_eq!(sink.name(), "log");
    }
}

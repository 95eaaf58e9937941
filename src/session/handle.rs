//! Handles for controlling a session from another thread.

use super::SessionSummary;
use crate::error::{Result, VoxError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

/// Asks a running session to stop after the frame in flight.
#[derive(Debug, Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    pub(crate) fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// A session running on its own thread.
///
/// Dropping the handle stops the session and waits for it.
pub struct SessionHandle {
    stop: StopHandle,
    thread: Option<JoinHandle<Result<SessionSummary>>>,
}

impl SessionHandle {
    pub(crate) fn new(stop: StopHandle, thread: JoinHandle<Result<SessionSummary>>) -> Self {
        Self {
            stop,
            thread: Some(thread),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the session and wait for its summary.
    pub fn stop(mut self) -> Result<SessionSummary> {
        self.stop.stop();
        self.wait()
    }

    /// Wait for the session to end on its own, e.g. when a file source
    /// finishes.
    pub fn join(mut self) -> Result<SessionSummary> {
        self.wait()
    }

    fn wait(&mut self) -> Result<SessionSummary> {
        let Some(thread) = self.thread.take() else {
            return Err(VoxError::SessionState {
                message: "session thread already joined".to_string(),
            });
        };
        match thread.join() {
            Ok(result) => result,
            Err(panic_info) => {
                let msg = panic_info
                    .downcast_ref::<&str>()
                    .copied()
                    .or_else(|| panic_info.downcast_ref::<String>().map(|s| s.as_str()))
                    .unwrap_or("unknown panic");
                Err(VoxError::Other(format!("session thread panicked: {msg}")))
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop.stop();
            if let Err(e) = self.wait() {
                log::warn!("Session ended with error: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_handle_is_shared() {
        let flag = Arc::new(AtomicBool::new(false));
        let a = StopHandle::new(Arc::clone(&flag));
        let b = a.clone();
        assert!(!b.is_stopped());
        a.stop();
        assert!(b.is_stopped());
    }

    #[test]
    fn join_returns_thread_result() {
        let flag = Arc::new(AtomicBool::new(false));
        let thread = std::thread::spawn(|| {
            Ok(SessionSummary {
                segments: 2,
                frames: 10,
                transcript: None,
            })
        });
        let handle = SessionHandle::new(StopHandle::new(flag), thread);
        let summary = handle.join().unwrap();
        assert_eq!(summary.segments, 2);
    }

    #[test]
    fn panic_becomes_error() {
        let flag = Arc::new(AtomicBool::new(false));
        let thread = std::thread::spawn(|| -> Result<SessionSummary> { panic!("boom") });
        let handle = SessionHandle::new(StopHandle::new(flag), thread);
        match handle.stop() {
            Err(VoxError::Other(msg)) => assert!(msg.contains("boom")),
            other => panic!("Expected panic error, got {other:?}"),
        }
    }

    #[test]
    fn drop_signals_stop() {
        let flag = Arc::new(AtomicBool::new(false));
        let seen = Arc::clone(&flag);
        let thread = std::thread::spawn(move || {
            while !seen.load(Ordering::SeqCst) {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            Ok(SessionSummary::default())
        });
        drop(SessionHandle::new(StopHandle::new(Arc::clone(&flag)), thread));
        assert!(flag.load(Ordering::SeqCst));
    }
}

//! Request handler backing the host bridge.

use crate::audio::{AudioFormat, AudioSource, FileDecodeOptions};
use crate::device::MacAddress;
use crate::error::{Result, VoxError};
use crate::ipc::protocol::{Request, Response};
use crate::ipc::server::RequestHandler;
use crate::logging::FileLogger;
use crate::recognizer::{RecognizerConfig, RecognizerFactory};
use crate::session::{RecognitionSession, SessionHandle, decode_file};
use crate::sink::{ChannelSink, RecognitionEvent};
use crate::store::KvStore;
use crossbeam_channel::{Receiver, bounded};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Events buffered between two `model-take-results` calls.
const RESULT_QUEUE: usize = 1024;

/// Poll interval while draining events from a stopping session.
const STOP_DRAIN_POLL: Duration = Duration::from_millis(10);

/// Opens the live input for a recognition session.
pub type LiveSourceFactory =
    Arc<dyn Fn(Option<&str>, AudioFormat) -> Result<Box<dyn AudioSource>> + Send + Sync>;

/// Microphone capture when built with `cpal-audio`.
pub fn default_live_source() -> LiveSourceFactory {
    #[cfg(feature = "cpal-audio")]
    {
        Arc::new(|device, format| {
            let source = crate::audio::capture::LiveCaptureSource::new(device, format)?;
            Ok(Box::new(source) as Box<dyn AudioSource>)
        })
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        Arc::new(|_, _| {
            Err(VoxError::configuration(
                "live capture is not available (built without the cpal-audio feature)",
            ))
        })
    }
}

/// `events` is declared first so it drops before `handle`: a session blocked
/// delivering a final then sees a closed channel instead of waiting forever.
struct LiveRecognition {
    events: Receiver<RecognitionEvent>,
    handle: SessionHandle,
}

/// Dispatches bridge requests to the store, the logger, device identity and
/// recognition. At most one live session runs at a time.
pub struct HostHandler<F> {
    store: Arc<KvStore>,
    logger: Option<Arc<FileLogger>>,
    devices: Vec<MacAddress>,
    config: RecognizerConfig,
    file_options: FileDecodeOptions,
    default_device: Option<String>,
    factory: F,
    live_source: LiveSourceFactory,
    live: Mutex<Option<LiveRecognition>>,
}

impl<F> HostHandler<F>
where
    F: RecognizerFactory + Clone + Sync + 'static,
    F::Recognizer: 'static,
{
    pub fn new(store: Arc<KvStore>, config: RecognizerConfig, factory: F) -> Self {
        Self {
            store,
            logger: None,
            devices: Vec::new(),
            config,
            file_options: FileDecodeOptions::default(),
            default_device: None,
            factory,
            live_source: default_live_source(),
            live: Mutex::new(None),
        }
    }

    pub fn with_logger(mut self, logger: Arc<FileLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_devices(mut self, devices: Vec<MacAddress>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_file_options(mut self, options: FileDecodeOptions) -> Self {
        self.file_options = options;
        self
    }

    /// Input device used when a start request names none.
    pub fn with_default_device(mut self, device: Option<String>) -> Self {
        self.default_device = device;
        self
    }

    pub fn with_live_source(mut self, live_source: LiveSourceFactory) -> Self {
        self.live_source = live_source;
        self
    }

    pub async fn is_recognizing(&self) -> bool {
        self.live
            .lock()
            .await
            .as_ref()
            .is_some_and(|live| !live.handle.is_finished())
    }

    fn store_request(&self, request: Request) -> Result<Response> {
        match request {
            Request::StoreGet { key } => Ok(Response::Value {
                value: self.store.get(&key)?,
            }),
            Request::StoreSet {
                key,
                value,
                options,
            } => {
                self.store.set(&key, value, &options)?;
                Ok(Response::Ok)
            }
            Request::StoreOnce {
                key,
                value,
                options,
            } => {
                self.store.once(&key, value, &options)?;
                Ok(Response::Ok)
            }
            Request::StoreDelete { key } => Ok(Response::Value {
                value: Some(json!(self.store.remove(&key)?)),
            }),
            Request::StoreGetAll => Ok(Response::Values {
                values: self.store.get_all(),
            }),
            other => Err(VoxError::IpcProtocol {
                message: format!("{} is not a store channel", other.channel()),
            }),
        }
    }

    async fn start_recognition(&self, device: Option<String>) -> Response {
        let mut live = self.live.lock().await;
        if live.as_ref().is_some_and(|l| !l.handle.is_finished()) {
            return Response::error("real-time recognition is already running");
        }
        if let Some(previous) = live.take()
            && let Err(e) = previous.handle.join()
        {
            log::warn!("Previous recognition session ended with error: {}", e);
        }

        let device = device.or_else(|| self.default_device.clone());
        let (tx, rx) = bounded(RESULT_QUEUE);
        let config = self.config.clone();
        let factory = self.factory.clone();
        let live_source = Arc::clone(&self.live_source);

        let started = tokio::task::spawn_blocking(move || -> Result<SessionHandle> {
            let format = AudioFormat::mono(config.sample_rate());
            let source = live_source(device.as_deref(), format)?;
            let mut session = RecognitionSession::new(config, factory, ChannelSink::new(tx))?;
            session.start(source)?;
            session.spawn()
        })
        .await;

        match started {
            Ok(Ok(handle)) => {
                *live = Some(LiveRecognition { events: rx, handle });
                Response::Ok
            }
            Ok(Err(e)) => {
                log::error!("Failed to start real-time recognition: {}", e);
                Response::error(e)
            }
            Err(e) => Response::error(format!("recognition start task failed: {}", e)),
        }
    }

    async fn stop_recognition(&self) -> Response {
        let Some(LiveRecognition { handle, events }) = self.live.lock().await.take() else {
            return Response::error("real-time recognition is not running");
        };
        let stopped = tokio::task::spawn_blocking(move || -> Result<_> {
            // Keep draining: a session blocked on a full queue only sees the
            // stop flag once its final is delivered.
            handle.stop_handle().stop();
            let mut drained = Vec::new();
            while !handle.is_finished() {
                if let Ok(event) = events.recv_timeout(STOP_DRAIN_POLL) {
                    drained.push(event);
                }
            }
            let summary = handle.join()?;
            drained.extend(events.try_iter());
            Ok((summary, drained))
        })
        .await;
        match stopped {
            Ok(Ok((summary, events))) => {
                log::info!(
                    "Real-time recognition stopped after {} segment(s)",
                    summary.segments
                );
                Response::Events { events }
            }
            Ok(Err(e)) => Response::error(e),
            Err(e) => Response::error(format!("recognition stop task failed: {}", e)),
        }
    }

    async fn take_results(&self) -> Response {
        let mut live = self.live.lock().await;
        let Some(current) = live.as_ref() else {
            return Response::error("real-time recognition is not running");
        };
        let events: Vec<RecognitionEvent> = current.events.try_iter().collect();
        if events.is_empty()
            && current.handle.is_finished()
            && let Some(done) = live.take()
            && let Err(e) = done.handle.join()
        {
            return Response::error(e);
        }
        Response::Events { events }
    }

    async fn decode_audio_file(&self, path: PathBuf) -> Response {
        let config = self.config.clone();
        let options = self.file_options;
        let factory = self.factory.clone();
        let decoded =
            tokio::task::spawn_blocking(move || decode_file(&path, &config, options, factory))
                .await;
        match decoded {
            Ok(Ok(segments)) => Response::Transcript { segments },
            Ok(Err(e)) => Response::error(e),
            Err(e) => Response::error(format!("decode task failed: {}", e)),
        }
    }
}

#[async_trait::async_trait]
impl<F> RequestHandler for HostHandler<F>
where
    F: RecognizerFactory + Clone + Sync + 'static,
    F::Recognizer: 'static,
{
    async fn handle(&self, request: Request) -> Response {
        if let Some((level, message)) = request.log_message() {
            log::log!(target: "renderer", level.to_level(), "{}", message);
            return Response::Ok;
        }

        match request {
            Request::StoreGet { .. }
            | Request::StoreSet { .. }
            | Request::StoreOnce { .. }
            | Request::StoreDelete { .. }
            | Request::StoreGetAll => self.store_request(request).unwrap_or_else(Response::error),
            Request::LogGetLogFilePath => match &self.logger {
                Some(logger) => Response::Path {
                    path: logger.current_path(),
                },
                None => Response::error("file logging is disabled"),
            },
            Request::LogChangeLevel { level } => {
                match &self.logger {
                    Some(logger) => logger.change_level(level),
                    None => log::set_max_level(level.to_level_filter()),
                }
                log::info!("Log level changed to {}", level);
                Response::Ok
            }
            Request::GetDeviceMac => Response::Devices {
                devices: self.devices.clone(),
            },
            Request::ExitApp => {
                if self.is_recognizing().await {
                    let _ = self.stop_recognition().await;
                }
                log::info!("Exit requested");
                Response::Ok
            }
            Request::ModelStartRealTimeSpeechRecognition { device } => {
                self.start_recognition(device).await
            }
            Request::ModelStopRealTimeSpeechRecognition => self.stop_recognition().await,
            Request::ModelTakeResults => self.take_results().await,
            Request::ModelDecodeAudioFile { path } => self.decode_audio_file(path).await,
            other => Response::error(format!("unhandled channel {}", other.channel())),
        }
    }
}

//! Command implementations behind the CLI.
//!
//! Wires configuration, the recognizer factory, audio sources and sinks into
//! the session core, and assembles the IPC host for `serve`.

use crate::audio::{AudioFormat, FileDecodeSource};
use crate::config::Config;
use crate::device::{device_tag, mac_addresses};
use crate::error::{Result, VoxError};
use crate::ipc::{self, HostHandler, IpcServer, Request, RequestKind, Response};
use crate::logging::{self, FileLogger, LogLevel, LogSettings};
use crate::recognizer::{ModelConfig, RecognizerConfig, RecognizerFactory, TranscriberRecognizer};
use crate::session::{RecognitionSession, decode_file, decode_source};
use crate::sink::StdoutSink;
use crate::store::{KvStore, SetOptions};
use crate::stt::{WhisperConfig, WhisperTranscriber};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// How often `listen` checks whether the session ended on its own.
const LISTEN_POLL: Duration = Duration::from_millis(200);

/// Builds Whisper-backed recognizers, keeping the last loaded model so
/// consecutive sessions with the same model section skip the reload.
#[derive(Clone, Default)]
pub struct WhisperFactory {
    loaded: Arc<Mutex<Option<(ModelConfig, Arc<WhisperTranscriber>)>>>,
}

impl WhisperFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecognizerFactory for WhisperFactory {
    type Recognizer = TranscriberRecognizer<Arc<WhisperTranscriber>>;

    fn build(&self, config: &RecognizerConfig) -> Result<Self::Recognizer> {
        let mut loaded = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        let transcriber = match loaded.as_ref() {
            Some((model, transcriber)) if *model == config.model => Arc::clone(transcriber),
            _ => {
                let transcriber =
                    Arc::new(WhisperTranscriber::new(WhisperConfig::from(&config.model))?);
                *loaded = Some((config.model.clone(), Arc::clone(&transcriber)));
                transcriber
            }
        };
        Ok(TranscriberRecognizer::new(transcriber, config.clone()))
    }
}

/// Per-invocation overrides taken from the command line.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub device: Option<String>,
    pub model: Option<PathBuf>,
    pub language: Option<String>,
    pub tail_padding: Option<f32>,
}

impl Overrides {
    /// Apply to `config` and re-validate the result.
    pub fn apply(self, mut config: Config) -> Result<Config> {
        if let Some(device) = self.device {
            config.audio.device = Some(device);
        }
        if let Some(model) = self.model {
            config.recognizer.model.model_path = model;
        }
        if let Some(language) = self.language {
            config.recognizer.model.language = language;
        }
        if let Some(secs) = self.tail_padding {
            config.file.tail_padding_secs = secs;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Open the file logger for this process and register it with `log`.
///
/// `verbose` raises the level (1: at least info, 2+: debug) and echoes lines
/// to stderr. Old files are pruned before the first line is written.
pub fn setup_logging(config: &Config, verbose: u8) -> Result<Arc<FileLogger>> {
    let dir = config.log_dir();
    let level = match verbose {
        0 => config.log.level,
        1 => config.log.level.max(LogLevel::Info),
        _ => config.log.level.max(LogLevel::Debug),
    };

    let mut settings = LogSettings::new(&dir, device_tag(&mac_addresses()));
    settings.level = level;
    settings.max_file_bytes = config.log.max_file_bytes;
    settings.console = config.log.console || verbose > 0;

    let removed = logging::prune_old_logs(
        &dir,
        config.log.retention_days,
        chrono::Local::now().date_naive(),
    )?;

    let logger = Arc::new(FileLogger::new(settings));
    logging::install(Arc::clone(&logger))?;
    if !removed.is_empty() {
        log::info!("Pruned {} old log file(s) from {}", removed.len(), dir.display());
    }
    Ok(logger)
}

/// Recognize from the microphone until Ctrl-C or until the source ends.
pub async fn run_listen(config: &Config, quiet: bool) -> Result<()> {
    crate::sys::suppress_audio_warnings();

    let recognizer = config.recognizer.clone();
    let format = AudioFormat::mono(recognizer.sample_rate());
    let source = ipc::default_live_source()(config.audio.device.as_deref(), format)?;

    if !quiet {
        eprintln!("Loading model '{}'...", recognizer.model.model_path.display());
    }
    let mut session =
        RecognitionSession::new(recognizer, WhisperFactory::new(), StdoutSink::new(quiet))?;
    session.start(source)?;
    let handle = session.spawn()?;
    if !quiet {
        eprintln!("Ready. Listening... (Ctrl-C to stop)");
    }

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.map_err(|e| VoxError::Other(format!("Failed to wait for Ctrl-C: {}", e)))?;
                break;
            }
            _ = tokio::time::sleep(LISTEN_POLL) => {
                if handle.is_finished() {
                    break;
                }
            }
        }
    }

    if !quiet {
        eprintln!("\nShutting down...");
    }
    let summary = handle.stop()?;
    log::info!(
        "Listen session ended: {} segment(s), {} frame(s)",
        summary.segments,
        summary.frames
    );
    Ok(())
}

/// Decode a WAV file (or stdin for `-`) and print `<segment> <text>` lines.
pub fn run_decode<F: RecognizerFactory>(
    config: &Config,
    file: &Path,
    factory: F,
) -> Result<Vec<String>> {
    let finals = if file == Path::new("-") {
        config.file.validate_against(&config.recognizer.endpoint)?;
        let source = FileDecodeSource::from_stdin(config.recognizer.sample_rate(), config.file)?;
        decode_source(Box::new(source), &config.recognizer, factory)?
    } else {
        decode_file(file, &config.recognizer, config.file, factory)?
    };
    for (index, text) in finals.iter().enumerate() {
        println!("{} {}", index, text);
    }
    Ok(finals)
}

/// Print input device names, one per line.
pub fn run_devices() -> Result<()> {
    #[cfg(feature = "cpal-audio")]
    {
        crate::sys::suppress_audio_warnings();
        let devices = crate::audio::capture::list_devices()?;
        if devices.is_empty() {
            eprintln!("No audio input devices found.");
        }
        for device in devices {
            println!("{}", device);
        }
        Ok(())
    }
    #[cfg(not(feature = "cpal-audio"))]
    {
        Err(VoxError::configuration(
            "device listing is not available (built without the cpal-audio feature)",
        ))
    }
}

fn open_store(config: &Config) -> Result<KvStore> {
    KvStore::open(config.store_path(), &config.store.key_prefix)
}

/// Run the IPC host until `exit-app` or Ctrl-C.
pub async fn run_serve(
    config: &Config,
    socket: Option<PathBuf>,
    logger: Arc<FileLogger>,
) -> Result<()> {
    let socket = socket.unwrap_or_else(|| config.socket_path());
    let store = Arc::new(open_store(config)?);
    let devices = mac_addresses();
    log::info!(
        "Starting host on {} (store {}, {} network interface(s))",
        socket.display(),
        store.path().display(),
        devices.len()
    );

    let handler = HostHandler::new(store, config.recognizer.clone(), WhisperFactory::new())
        .with_logger(logger)
        .with_devices(devices)
        .with_file_options(config.file)
        .with_default_device(config.audio.device.clone());

    let server = IpcServer::new(socket);
    let state = server.state();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("Ctrl-C received, shutting down");
            state.set_shutdown().await;
        }
    });
    server.start(handler).await
}

/// Send one JSON request to a running host.
///
/// Fire-and-forget channels are delivered without waiting and yield `None`.
pub async fn run_invoke(socket: &Path, request_json: &str) -> Result<Option<Response>> {
    let request = Request::from_json(request_json).map_err(|e| VoxError::IpcProtocol {
        message: format!("Invalid request: {}", e),
    })?;
    match request.kind() {
        RequestKind::Send => {
            ipc::send(socket, &request).await?;
            Ok(None)
        }
        RequestKind::Invoke => ipc::invoke(socket, &request).await.map(Some),
    }
}

/// Read a CLI value as JSON, falling back to a plain string.
pub fn parse_store_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub fn store_get(config: &Config, key: &str) -> Result<Option<Value>> {
    open_store(config)?.get(key)
}

pub fn store_set(
    config: &Config,
    key: &str,
    raw: &str,
    expires: Option<f64>,
    once: bool,
) -> Result<()> {
    let options = SetOptions {
        expires,
        is_once: once,
    };
    open_store(config)?.set(key, parse_store_value(raw), &options)
}

pub fn store_remove(config: &Config, key: &str) -> Result<bool> {
    open_store(config)?.remove(key)
}

pub fn store_all(config: &Config) -> Result<Value> {
    let entries = open_store(config)?.get_all();
    Ok(serde_json::to_value(entries)?)
}

/// Today's log file path, without creating it.
pub fn log_file_path(config: &Config) -> PathBuf {
    let settings = LogSettings::new(config.log_dir(), device_tag(&mac_addresses()));
    FileLogger::new(settings).current_path()
}

pub fn prune_logs(config: &Config, days: Option<u32>) -> Result<Vec<PathBuf>> {
    logging::prune_old_logs(
        &config.log_dir(),
        days.unwrap_or(config.log.retention_days),
        chrono::Local::now().date_naive(),
    )
}

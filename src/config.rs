use crate::audio::FileDecodeOptions;
use crate::defaults;
use crate::error::{Result, VoxError};
use crate::logging::LogLevel;
use crate::recognizer::RecognizerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub recognizer: RecognizerConfig,
    pub file: FileDecodeOptions,
    pub log: LogConfig,
    pub store: StoreConfig,
    pub ipc: IpcConfig,
}

/// Live capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` picks the best default.
    pub device: Option<String>,
    pub channels: u16,
}

/// Log file configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogConfig {
    /// Defaults to `<data_dir>/voxdesk/logs`.
    pub dir: Option<PathBuf>,
    pub level: LogLevel,
    pub retention_days: u32,
    pub max_file_bytes: u64,
    /// Echo log lines to stderr.
    pub console: bool,
}

/// Key-value store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    /// Defaults to `<data_dir>/voxdesk/store.json`.
    pub path: Option<PathBuf>,
    pub key_prefix: String,
}

/// IPC host configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct IpcConfig {
    pub socket: Option<PathBuf>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            channels: defaults::CHANNELS,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: LogLevel::Info,
            retention_days: defaults::LOG_RETENTION_DAYS,
            max_file_bytes: defaults::LOG_MAX_FILE_BYTES,
            console: false,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            key_prefix: defaults::STORE_KEY_PREFIX.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .is_some_and(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                {
                    Ok(Self::default())
                } else {
                    Err(e.context(format!("Failed to load config from {}", path.display())))
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXDESK_MODEL → recognizer.model.model_path
    /// - VOXDESK_LANGUAGE → recognizer.model.language
    /// - VOXDESK_AUDIO_DEVICE → audio.device
    /// - VOXDESK_LOG_LEVEL → log.level
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("VOXDESK_MODEL")
            && !model.is_empty()
        {
            self.recognizer.model.model_path = PathBuf::from(model);
        }

        if let Ok(language) = std::env::var("VOXDESK_LANGUAGE")
            && !language.is_empty()
        {
            self.recognizer.model.language = language;
        }

        if let Ok(device) = std::env::var("VOXDESK_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.device = Some(device);
        }

        if let Ok(level) = std::env::var("VOXDESK_LOG_LEVEL")
            && !level.is_empty()
        {
            match level.parse::<LogLevel>() {
                Ok(level) => self.log.level = level,
                Err(e) => log::warn!("Ignoring VOXDESK_LOG_LEVEL: {}", e),
            }
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxdesk/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(defaults::APP_DIR)
            .join("config.toml")
    }

    /// Check cross-section constraints before anything is opened.
    pub fn validate(&self) -> Result<()> {
        if self.audio.channels != defaults::CHANNELS {
            return Err(VoxError::configuration(format!(
                "audio.channels must be {}, got {}",
                defaults::CHANNELS,
                self.audio.channels
            )));
        }
        self.recognizer.validate()?;
        self.file.validate_against(&self.recognizer.endpoint)?;
        if self.log.max_file_bytes == 0 {
            return Err(VoxError::configuration("log.max_file_bytes must be > 0"));
        }
        if self.store.key_prefix.is_empty() {
            return Err(VoxError::configuration("store.key_prefix must not be empty"));
        }
        Ok(())
    }

    pub fn log_dir(&self) -> PathBuf {
        self.log
            .dir
            .clone()
            .or_else(crate::logging::LogSettings::default_dir)
            .unwrap_or_else(|| PathBuf::from("logs"))
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .path
            .clone()
            .or_else(crate::store::KvStore::default_path)
            .unwrap_or_else(|| PathBuf::from("store.json"))
    }

    pub fn socket_path(&self) -> PathBuf {
        self.ipc
            .socket
            .clone()
            .unwrap_or_else(crate::ipc::default_socket_path)
    }
}

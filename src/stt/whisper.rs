//! Whisper-based speech-to-text transcription.
//!
//! Requires the `whisper` feature (and cmake at build time). Without it a
//! stub reports the model as not ready, so session start fails with a
//! configuration error instead of producing empty transcripts.

use crate::defaults;
use crate::error::{Result, VoxError};
use crate::recognizer::{ModelConfig, Provider};
use crate::stt::transcriber::Transcriber;
use std::path::PathBuf;

#[cfg(feature = "whisper")]
use std::sync::{Mutex, Once};
#[cfg(feature = "whisper")]
use whisper_rs::{
    FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters, install_logging_hooks,
};

#[cfg(feature = "whisper")]
static LOGGING_HOOKS_INSTALLED: Once = Once::new();

/// Configuration for Whisper transcriber.
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub model_path: PathBuf,
    /// Language code ("en", "de") or "auto".
    pub language: String,
    pub threads: usize,
    pub use_gpu: bool,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ggml-base.bin"),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            threads: defaults::NUM_THREADS as usize,
            use_gpu: false,
        }
    }
}

impl From<&ModelConfig> for WhisperConfig {
    fn from(model: &ModelConfig) -> Self {
        Self {
            model_path: model.model_path.clone(),
            language: model.language.clone(),
            threads: model.num_threads.max(1) as usize,
            use_gpu: model.provider == Provider::Gpu,
        }
    }
}

fn model_name_of(config: &WhisperConfig) -> String {
    config
        .model_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}

fn check_model_exists(config: &WhisperConfig) -> Result<()> {
    if config.model_path.exists() {
        Ok(())
    } else {
        Err(VoxError::configuration(format!(
            "Model not found: {}",
            config.model_path.display()
        )))
    }
}

#[cfg(feature = "whisper")]
pub struct WhisperTranscriber {
    context: Mutex<WhisperContext>,
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("config", &self.config)
            .field("model_name", &self.model_name)
            .field("context", &"<WhisperContext>")
            .finish()
    }
}

/// Placeholder used when the crate is built without `whisper`.
#[cfg(not(feature = "whisper"))]
#[derive(Debug)]
pub struct WhisperTranscriber {
    config: WhisperConfig,
    model_name: String,
}

#[cfg(feature = "whisper")]
impl WhisperTranscriber {
    /// Load a Whisper model.
    ///
    /// # Errors
    /// `Configuration` if the model file is missing or cannot be loaded.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        // whisper.cpp logs through its own hooks; route them once
        LOGGING_HOOKS_INSTALLED.call_once(|| {
            install_logging_hooks();
        });

        check_model_exists(&config)?;
        let model_name = model_name_of(&config);

        let mut context_params = WhisperContextParameters::default();
        context_params.use_gpu(config.use_gpu);
        context_params.flash_attn(true);
        let path = config
            .model_path
            .to_str()
            .ok_or_else(|| VoxError::configuration("Invalid UTF-8 in model path"))?;
        let context = WhisperContext::new_with_params(path, context_params).map_err(|e| {
            VoxError::configuration(format!("Failed to load Whisper model: {}", e))
        })?;

        log::info!(
            "Loaded Whisper model '{}' (threads={}, gpu={})",
            model_name,
            config.threads,
            config.use_gpu
        );

        Ok(Self {
            context: Mutex::new(context),
            config,
            model_name,
        })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(not(feature = "whisper"))]
impl WhisperTranscriber {
    /// Stub constructor: validates the model path only.
    pub fn new(config: WhisperConfig) -> Result<Self> {
        check_model_exists(&config)?;
        let model_name = model_name_of(&config);
        Ok(Self { config, model_name })
    }

    pub fn config(&self) -> &WhisperConfig {
        &self.config
    }
}

#[cfg(feature = "whisper")]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, audio: &[f32]) -> Result<String> {
        let context = self.context.lock().map_err(|e| VoxError::Recognition {
            message: format!("Failed to acquire context lock: {}", e),
        })?;

        let mut state = context.create_state().map_err(|e| VoxError::Recognition {
            message: format!("Failed to create Whisper state: {}", e),
        })?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        if self.config.language == defaults::AUTO_LANGUAGE {
            params.set_language(None);
        } else {
            params.set_language(Some(&self.config.language));
        }
        params.set_n_threads(self.config.threads as i32);
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state.full(params, audio).map_err(|e| VoxError::Recognition {
            message: format!("Whisper inference failed: {}", e),
        })?;

        let mut transcription = String::new();
        for segment in state.as_iter() {
            transcription.push_str(&segment.to_string());
        }
        Ok(transcription.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        true
    }
}

#[cfg(not(feature = "whisper"))]
impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, _audio: &[f32]) -> Result<String> {
        Err(VoxError::configuration(
            "Whisper feature not enabled. Rebuild with --features whisper (requires cmake)",
        ))
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn is_ready(&self) -> bool {
        false
    }
}

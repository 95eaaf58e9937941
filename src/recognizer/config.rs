//! Recognizer configuration: feature extraction, model, decoder, endpoint.

use crate::defaults;
use crate::error::{Result, VoxError};
use crate::recognizer::endpoint::EndpointConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub feature: FeatureConfig,
    pub model: ModelConfig,
    pub decoder: DecoderConfig,
    pub endpoint: EndpointConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub sample_rate: u32,
    pub feature_dim: u32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            sample_rate: defaults::SAMPLE_RATE,
            feature_dim: defaults::FEATURE_DIM,
        }
    }
}

/// Where the model runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    #[default]
    Cpu,
    Gpu,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub model_path: PathBuf,
    pub language: String,
    pub num_threads: u32,
    pub provider: Provider,
    /// Ask the backend to print its own diagnostics.
    pub debug: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::new(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            num_threads: defaults::NUM_THREADS,
            provider: Provider::Cpu,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodingMethod {
    #[default]
    GreedySearch,
    ModifiedBeamSearch,
}

impl std::fmt::Display for DecodingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GreedySearch => write!(f, "greedy_search"),
            Self::ModifiedBeamSearch => write!(f, "modified_beam_search"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    pub method: DecodingMethod,
    /// Beam width, used by `modified_beam_search` only.
    pub max_active_paths: u32,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            method: DecodingMethod::GreedySearch,
            max_active_paths: defaults::MAX_ACTIVE_PATHS,
        }
    }
}

impl RecognizerConfig {
    /// Reject values no recognizer can work with.
    pub fn validate(&self) -> Result<()> {
        if self.feature.sample_rate == 0 {
            return Err(VoxError::configuration("feature.sample_rate must be > 0"));
        }
        if self.feature.feature_dim == 0 {
            return Err(VoxError::configuration("feature.feature_dim must be > 0"));
        }
        if self.model.num_threads == 0 {
            return Err(VoxError::configuration("model.num_threads must be > 0"));
        }
        if self.decoder.max_active_paths == 0 {
            return Err(VoxError::configuration(
                "decoder.max_active_paths must be > 0",
            ));
        }
        self.endpoint.validate()
    }

    pub fn sample_rate(&self) -> u32 {
        self.feature.sample_rate
    }
}

//! Audio frames flowing from a source into a recognition session.

use serde::{Deserialize, Serialize};

/// Sample rate and channel count shared by every frame of one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Single-channel format at the given rate.
    pub fn mono(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// Raw sample payload. File sources deliver 16-bit PCM, live capture
/// delivers 32-bit float.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    I16(Vec<i16>),
    F32(Vec<f32>),
}

/// Immutable buffer of PCM samples with the format they were captured in.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Position of this frame in its source, starting at 0.
    pub sequence: u64,
    pub format: AudioFormat,
    samples: Samples,
}

impl AudioFrame {
    pub fn from_i16(sequence: u64, format: AudioFormat, samples: Vec<i16>) -> Self {
        Self {
            sequence,
            format,
            samples: Samples::I16(samples),
        }
    }

    pub fn from_f32(sequence: u64, format: AudioFormat, samples: Vec<f32>) -> Self {
        Self {
            sequence,
            format,
            samples: Samples::F32(samples),
        }
    }

    pub fn samples(&self) -> &Samples {
        &self.samples
    }

    pub fn len(&self) -> usize {
        match &self.samples {
            Samples::I16(s) => s.len(),
            Samples::F32(s) => s.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Duration of this frame in milliseconds.
    pub fn duration_ms(&self) -> u32 {
        let per_channel = self.len() as u64 / u64::from(self.format.channels.max(1));
        (per_channel * 1000 / u64::from(self.format.sample_rate.max(1))) as u32
    }

    /// Samples as `f32` in `[-1.0, 1.0]`, the representation the recognizer
    /// accepts. Integer samples are divided by 32768.
    pub fn to_normalized(&self) -> Vec<f32> {
        match &self.samples {
            Samples::I16(s) => s.iter().map(|&x| f32::from(x) / 32768.0).collect(),
            Samples::F32(s) => s.clone(),
        }
    }
}

/// Root-mean-square level of normalized samples (0.0 = silence).
pub fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum_squares / samples.len() as f64).sqrt() as f32
}

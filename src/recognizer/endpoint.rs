//! Utterance endpoint rules.
//!
//! An endpoint fires when any enabled rule matches. Each rule is
//! `(must_contain_nonsilence, min_trailing_silence, min_utterance_length)`:
//!
//! | rule | needs speech | trailing silence | utterance length |
//! |------|--------------|------------------|------------------|
//! | 1    | no           | rule1 seconds    | any              |
//! | 2    | yes          | rule2 seconds    | any              |
//! | 3    | no           | any              | rule3 seconds    |

use crate::defaults;
use crate::error::{Result, VoxError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EndpointRule {
    pub must_contain_nonsilence: bool,
    pub min_trailing_silence: f32,
    pub min_utterance_length: f32,
}

impl EndpointRule {
    pub fn matches(&self, contains_nonsilence: bool, trailing_silence: f32, utterance: f32) -> bool {
        (!self.must_contain_nonsilence || contains_nonsilence)
            && trailing_silence >= self.min_trailing_silence
            && utterance >= self.min_utterance_length
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub enabled: bool,
    pub rule1_min_trailing_silence: f32,
    pub rule2_min_trailing_silence: f32,
    pub rule3_min_utterance_length: f32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            rule1_min_trailing_silence: defaults::RULE1_MIN_TRAILING_SILENCE,
            rule2_min_trailing_silence: defaults::RULE2_MIN_TRAILING_SILENCE,
            rule3_min_utterance_length: defaults::RULE3_MIN_UTTERANCE_LENGTH,
        }
    }
}

impl EndpointConfig {
    pub fn rules(&self) -> [EndpointRule; 3] {
        [
            EndpointRule {
                must_contain_nonsilence: false,
                min_trailing_silence: self.rule1_min_trailing_silence,
                min_utterance_length: 0.0,
            },
            EndpointRule {
                must_contain_nonsilence: true,
                min_trailing_silence: self.rule2_min_trailing_silence,
                min_utterance_length: 0.0,
            },
            EndpointRule {
                must_contain_nonsilence: false,
                min_trailing_silence: 0.0,
                min_utterance_length: self.rule3_min_utterance_length,
            },
        ]
    }

    /// True when endpointing is enabled and any rule fires.
    ///
    /// `utterance_secs` counts everything since the last reset, silence
    /// included.
    pub fn detect(
        &self,
        contains_nonsilence: bool,
        trailing_silence_secs: f32,
        utterance_secs: f32,
    ) -> bool {
        self.enabled
            && self
                .rules()
                .iter()
                .any(|r| r.matches(contains_nonsilence, trailing_silence_secs, utterance_secs))
    }

    /// Longest trailing silence any rule waits for.
    pub fn max_trailing_silence(&self) -> f32 {
        self.rule1_min_trailing_silence
            .max(self.rule2_min_trailing_silence)
    }

    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("rule1_min_trailing_silence", self.rule1_min_trailing_silence),
            ("rule2_min_trailing_silence", self.rule2_min_trailing_silence),
            ("rule3_min_utterance_length", self.rule3_min_utterance_length),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(VoxError::configuration(format!(
                    "endpoint.{} must be a positive number of seconds, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

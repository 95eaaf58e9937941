//! JSON message protocol between the UI process and the host.
//!
//! Every request names its channel:
//!
//! ```json
//! {"channel":"store-set","key":"theme","value":"dark"}
//! ```
//!
//! Responses carry a `type` tag.

use crate::device::MacAddress;
use crate::logging::LogLevel;
use crate::sink::RecognitionEvent;
use crate::store::SetOptions;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Channel names shared by both sides of the bridge.
pub mod channels {
    pub const STORE_GET: &str = "store-get";
    pub const STORE_SET: &str = "store-set";
    pub const STORE_DELETE: &str = "store-delete";
    pub const STORE_ONCE: &str = "store-once";
    pub const STORE_GET_ALL: &str = "store-get-all";

    pub const LOG_INFO: &str = "log-info";
    pub const LOG_WARN: &str = "log-warn";
    pub const LOG_ERROR: &str = "log-error";
    pub const LOG_DEBUG: &str = "log-debug";
    pub const LOG_VERBOSE: &str = "log-verbose";
    pub const LOG_SILLY: &str = "log-silly";
    pub const LOG_GET_LOG_FILE_PATH: &str = "log-get-log-file-path";
    pub const LOG_CHANGE_LEVEL: &str = "log-change-level";

    pub const GET_DEVICE_MAC: &str = "get-device-mac";
    pub const EXIT_APP: &str = "exit-app";

    pub const MODEL_START_REAL_TIME_SPEECH_RECOGNITION: &str =
        "model-start-real-time-speech-recognition";
    pub const MODEL_STOP_REAL_TIME_SPEECH_RECOGNITION: &str =
        "model-stop-real-time-speech-recognition";
    pub const MODEL_TAKE_RESULTS: &str = "model-take-results";
    pub const MODEL_DECODE_AUDIO_FILE: &str = "model-decode-audio-file";
}

/// Whether the sender waits for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Fire-and-forget; the host never replies.
    Send,
    /// Request/response.
    Invoke,
}

/// Requests sent by the UI process to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", rename_all = "kebab-case")]
pub enum Request {
    StoreGet {
        key: String,
    },
    StoreSet {
        key: String,
        value: Value,
        #[serde(default)]
        options: SetOptions,
    },
    StoreDelete {
        key: String,
    },
    StoreOnce {
        key: String,
        value: Value,
        #[serde(default)]
        options: SetOptions,
    },
    StoreGetAll,

    LogInfo {
        message: String,
    },
    LogWarn {
        message: String,
    },
    LogError {
        message: String,
    },
    LogDebug {
        message: String,
    },
    LogVerbose {
        message: String,
    },
    LogSilly {
        message: String,
    },
    LogGetLogFilePath,
    LogChangeLevel {
        level: LogLevel,
    },

    GetDeviceMac,
    ExitApp,

    /// Start live recognition on the named (or default) input device.
    ModelStartRealTimeSpeechRecognition {
        #[serde(default)]
        device: Option<String>,
    },
    ModelStopRealTimeSpeechRecognition,
    /// Drain the events produced since the last call.
    ModelTakeResults,
    ModelDecodeAudioFile {
        path: PathBuf,
    },
}

impl Request {
    /// The channel constant this request travels on.
    pub fn channel(&self) -> &'static str {
        match self {
            Self::StoreGet { .. } => channels::STORE_GET,
            Self::StoreSet { .. } => channels::STORE_SET,
            Self::StoreDelete { .. } => channels::STORE_DELETE,
            Self::StoreOnce { .. } => channels::STORE_ONCE,
            Self::StoreGetAll => channels::STORE_GET_ALL,
            Self::LogInfo { .. } => channels::LOG_INFO,
            Self::LogWarn { .. } => channels::LOG_WARN,
            Self::LogError { .. } => channels::LOG_ERROR,
            Self::LogDebug { .. } => channels::LOG_DEBUG,
            Self::LogVerbose { .. } => channels::LOG_VERBOSE,
            Self::LogSilly { .. } => channels::LOG_SILLY,
            Self::LogGetLogFilePath => channels::LOG_GET_LOG_FILE_PATH,
            Self::LogChangeLevel { .. } => channels::LOG_CHANGE_LEVEL,
            Self::GetDeviceMac => channels::GET_DEVICE_MAC,
            Self::ExitApp => channels::EXIT_APP,
            Self::ModelStartRealTimeSpeechRecognition { .. } => {
                channels::MODEL_START_REAL_TIME_SPEECH_RECOGNITION
            }
            Self::ModelStopRealTimeSpeechRecognition => {
                channels::MODEL_STOP_REAL_TIME_SPEECH_RECOGNITION
            }
            Self::ModelTakeResults => channels::MODEL_TAKE_RESULTS,
            Self::ModelDecodeAudioFile { .. } => channels::MODEL_DECODE_AUDIO_FILE,
        }
    }

    pub fn kind(&self) -> RequestKind {
        if self.log_message().is_some() || matches!(self, Self::ExitApp) {
            RequestKind::Send
        } else {
            RequestKind::Invoke
        }
    }

    /// Level and text of a `log-<level>` message.
    pub fn log_message(&self) -> Option<(LogLevel, &str)> {
        match self {
            Self::LogInfo { message } => Some((LogLevel::Info, message)),
            Self::LogWarn { message } => Some((LogLevel::Warn, message)),
            Self::LogError { message } => Some((LogLevel::Error, message)),
            Self::LogDebug { message } => Some((LogLevel::Debug, message)),
            Self::LogVerbose { message } => Some((LogLevel::Verbose, message)),
            Self::LogSilly { message } => Some((LogLevel::Silly, message)),
            _ => None,
        }
    }

    /// Serialize request to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize request from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Responses sent by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Request succeeded
    Ok,
    /// A single stored value, `null` when missing
    Value { value: Option<Value> },
    /// Raw store contents keyed by prefixed key
    Values { values: BTreeMap<String, Value> },
    Path { path: PathBuf },
    Devices { devices: Vec<MacAddress> },
    /// Recognition events in emission order
    Events { events: Vec<RecognitionEvent> },
    /// Final segments of a decoded file
    Transcript { segments: Vec<String> },
    /// Error occurred
    Error { message: String },
}

impl Response {
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }

    /// Serialize response to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize response from JSON string.
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn every_request() -> Vec<Request> {
        vec![
            Request::StoreGet { key: "k".into() },
            Request::StoreSet {
                key: "k".into(),
                value: json!(1),
                options: SetOptions::default(),
            },
            Request::StoreDelete { key: "k".into() },
            Request::StoreOnce {
                key: "k".into(),
                value: json!(1),
                options: SetOptions::default(),
            },
            Request::StoreGetAll,
            Request::LogInfo {
                message: "m".into(),
            },
            Request::LogWarn {
                message: "m".into(),
            },
            Request::LogError {
                message: "m".into(),
            },
            Request::LogDebug {
                message: "m".into(),
            },
            Request::LogVerbose {
                message: "m".into(),
            },
            Request::LogSilly {
                message: "m".into(),
            },
            Request::LogGetLogFilePath,
            Request::LogChangeLevel {
                level: LogLevel::Debug,
            },
            Request::GetDeviceMac,
            Request::ExitApp,
            Request::ModelStartRealTimeSpeechRecognition { device: None },
            Request::ModelStopRealTimeSpeechRecognition,
            Request::ModelTakeResults,
            Request::ModelDecodeAudioFile {
                path: "/tmp/a.wav".into(),
            },
        ]
    }

    #[test]
    fn test_channel_tag_matches_channel_constant() {
        for request in every_request() {
            let json: Value = serde_json::from_str(&request.to_json().unwrap()).unwrap();
            assert_eq!(
                json["channel"],
                request.channel(),
                "tag mismatch for {:?}",
                request
            );
        }
    }

    #[test]
    fn test_send_kinds() {
        let sends: Vec<&str> = every_request()
            .iter()
            .filter(|r| r.kind() == RequestKind::Send)
            .map(Request::channel)
            .collect();
        assert_eq!(
            sends,
            vec![
                channels::LOG_INFO,
                channels::LOG_WARN,
                channels::LOG_ERROR,
                channels::LOG_DEBUG,
                channels::LOG_VERBOSE,
                channels::LOG_SILLY,
                channels::EXIT_APP,
            ]
        );
    }

    #[test]
    fn test_store_set_options_are_optional() {
        let request =
            Request::from_json(r#"{"channel":"store-set","key":"theme","value":"dark"}"#).unwrap();
        assert_eq!(
            request,
            Request::StoreSet {
                key: "theme".into(),
                value: json!("dark"),
                options: SetOptions::default(),
            }
        );

        let request = Request::from_json(
            r#"{"channel":"store-once","key":"tip","value":1,"options":{"expires":7}}"#,
        )
        .unwrap();
        match request {
            Request::StoreOnce { options, .. } => assert_eq!(options.expires, Some(7.0)),
            other => panic!("Expected StoreOnce, got {other:?}"),
        }
    }

    #[test]
    fn test_log_change_level_uses_host_vocabulary() {
        let request =
            Request::from_json(r#"{"channel":"log-change-level","level":"silly"}"#).unwrap();
        assert_eq!(
            request,
            Request::LogChangeLevel {
                level: LogLevel::Silly
            }
        );
    }

    #[test]
    fn test_unknown_channel_is_rejected() {
        assert!(Request::from_json(r#"{"channel":"open-devtools"}"#).is_err());
        assert!(Request::from_json(r#"{"key":"x"}"#).is_err());
        assert!(Request::from_json("not json at all").is_err());
    }

    #[test]
    fn test_response_json_format() {
        assert_eq!(Response::Ok.to_json().unwrap(), r#"{"type":"ok"}"#);
        assert_eq!(
            Response::Value { value: None }.to_json().unwrap(),
            r#"{"type":"value","value":null}"#
        );
        assert_eq!(
            Response::error("boom").to_json().unwrap(),
            r#"{"type":"error","message":"boom"}"#
        );
    }

    #[test]
    fn test_events_response_nests_tagged_events() {
        let response = Response::Events {
            events: vec![RecognitionEvent::Final {
                segment_index: 0,
                text: "hi".into(),
            }],
        };
        let json = response.to_json().unwrap();
        assert_eq!(
            json,
            r#"{"type":"events","events":[{"type":"final","segment_index":0,"text":"hi"}]}"#
        );
        assert_eq!(Response::from_json(&json).unwrap(), response);
    }
}

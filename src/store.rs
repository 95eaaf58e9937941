//! Key-value persistence for the host.
//!
//! Every value is wrapped in an envelope carrying its write time and
//! optional expiry/once flags, and stored under a prefixed key:
//!
//! ```text
//! "__hr_ai__theme__": { "data": "dark", "keyInfo": { "timestamp": 1700000000000 } }
//! ```
//!
//! The whole map lives in one JSON file that is rewritten atomically
//! (temp file + rename) after every mutation.

use crate::defaults;
use crate::error::{Result, VoxError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const MS_PER_DAY: f64 = 86_400_000.0;

/// Source of "now" for expiry checks.
pub trait WallClock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemWallClock;

impl WallClock for SystemWallClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Metadata stored next to each value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInfo {
    pub timestamp: i64,
    /// Lifetime in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_once: Option<bool>,
}

impl KeyInfo {
    /// An expiry of zero or NaN days means the value never expires.
    fn is_expired(&self, now_ms: i64) -> bool {
        match self.expires {
            Some(days) if days != 0.0 && !days.is_nan() => {
                (self.timestamp as f64 + days * MS_PER_DAY) < now_ms as f64
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub data: Value,
    pub key_info: KeyInfo,
}

/// Options accepted by `set`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetOptions {
    /// Lifetime in days.
    #[serde(default)]
    pub expires: Option<f64>,
    /// Delete the value the first time it is read.
    #[serde(default)]
    pub is_once: bool,
}

impl SetOptions {
    pub fn expires_in_days(days: f64) -> Self {
        Self {
            expires: Some(days),
            is_once: false,
        }
    }
}

pub struct KvStore {
    path: PathBuf,
    prefix: String,
    entries: Mutex<BTreeMap<String, Value>>,
    clock: Arc<dyn WallClock>,
}

impl KvStore {
    /// Open the store at `path`. A missing or empty file is an empty store.
    pub fn open(path: impl Into<PathBuf>, prefix: &str) -> Result<Self> {
        let path = path.into();
        let entries = load_entries(&path)?;
        log::debug!("Opened store {} ({} keys)", path.display(), entries.len());
        Ok(Self {
            path,
            prefix: prefix.to_string(),
            entries: Mutex::new(entries),
            clock: Arc::new(SystemWallClock),
        })
    }

    /// Replace the wall clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn WallClock>) -> Self {
        self.clock = clock;
        self
    }

    /// `<data_dir>/voxdesk/store.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(defaults::APP_DIR).join("store.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The key as stored on disk: `__<prefix>__<key>__`.
    pub fn prefixed_key(&self, key: &str) -> String {
        format!("__{}__{}__", self.prefix, key)
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Read a value. Expired values are deleted and read as missing; a
    /// once-value is deleted and returned.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        let full = self.prefixed_key(key);
        let mut entries = self.lock();
        let Some(raw) = entries.get(&full) else {
            return Ok(None);
        };
        let envelope: Envelope = match serde_json::from_value(raw.clone()) {
            Ok(envelope) => envelope,
            Err(e) => {
                log::warn!("Ignoring malformed store entry {}: {}", full, e);
                return Ok(None);
            }
        };

        if envelope.key_info.is_expired(self.clock.now_ms()) {
            self.commit(&mut entries, |next| next.remove(&full))?;
            return Ok(None);
        }
        if envelope.key_info.is_once == Some(true) {
            self.commit(&mut entries, |next| next.remove(&full))?;
        }
        Ok(Some(envelope.data))
    }

    pub fn set(&self, key: &str, value: Value, options: &SetOptions) -> Result<()> {
        let envelope = Envelope {
            data: value,
            key_info: KeyInfo {
                timestamp: self.clock.now_ms(),
                expires: options.expires,
                is_once: options.is_once.then_some(true),
            },
        };
        let value = serde_json::to_value(envelope)?;
        let mut entries = self.lock();
        self.commit(&mut entries, |next| next.insert(self.prefixed_key(key), value))?;
        Ok(())
    }

    /// Store a value that is deleted by its first read.
    pub fn once(&self, key: &str, value: Value, options: &SetOptions) -> Result<()> {
        let options = SetOptions {
            is_once: true,
            ..options.clone()
        };
        self.set(key, value, &options)
    }

    /// Delete a key. Returns whether it existed.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let full = self.prefixed_key(key);
        let mut entries = self.lock();
        if !entries.contains_key(&full) {
            return Ok(false);
        }
        self.commit(&mut entries, |next| next.remove(&full))?;
        Ok(true)
    }

    /// The raw map: prefixed keys to envelopes.
    pub fn get_all(&self) -> BTreeMap<String, Value> {
        self.lock().clone()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn set_value<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set(key, serde_json::to_value(value)?, &SetOptions::default())
    }

    /// Apply `change` to a copy of the map, write the copy, then swap it in.
    /// A failed write leaves the in-memory map untouched.
    fn commit<T>(
        &self,
        entries: &mut BTreeMap<String, Value>,
        change: impl FnOnce(&mut BTreeMap<String, Value>) -> T,
    ) -> Result<T> {
        let mut next = entries.clone();
        let out = change(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(out)
    }

    fn persist(&self, entries: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| store_error(&self.path, e))?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| store_error(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| store_error(&self.path, e))
    }
}

fn load_entries(path: &Path) -> Result<BTreeMap<String, Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(store_error(path, e)),
    };
    if content.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&content).map_err(|e| VoxError::Store {
        message: format!("{} is not a JSON object: {}", path.display(), e),
    })
}

fn store_error(path: &Path, e: std::io::Error) -> VoxError {
    VoxError::Store {
        message: format!("{}: {}", path.display(), e),
    }
}

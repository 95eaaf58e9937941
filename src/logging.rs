//! File logger behind the `log` facade.
//!
//! One file per day and device, `<YYYY-MM-DD>-[<tag>].log`, with lines like
//!
//! ```text
//! [2024-05-01 09:30:12.045] [info] Session listening on file source (16000Hz/1ch)
//! ```
//!
//! A file that grows past `max_file_bytes` is moved to `<date>-[<tag>].old.log`
//! and writing continues in a fresh file. Files older than the retention
//! window are removed by `prune_old_logs` at startup.

use crate::defaults;
use crate::error::{Result, VoxError};
use chrono::{Days, Local, NaiveDate, NaiveDateTime};
use crossbeam_channel::Sender;
use log::{Level, LevelFilter, Log, Metadata, Record};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

const DATE_FORMAT: &str = "%Y-%m-%d";
const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Host log levels, most severe first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Silly,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        Self::Error,
        Self::Warn,
        Self::Info,
        Self::Verbose,
        Self::Debug,
        Self::Silly,
    ];

    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Verbose | Self::Debug => LevelFilter::Debug,
            Self::Silly => LevelFilter::Trace,
        }
    }

    /// Facade level a host-side `log-<level>` message is written at.
    pub fn to_level(self) -> Level {
        match self {
            Self::Error => Level::Error,
            Self::Warn => Level::Warn,
            Self::Info => Level::Info,
            Self::Verbose | Self::Debug => Level::Debug,
            Self::Silly => Level::Trace,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Verbose => "verbose",
            Self::Debug => "debug",
            Self::Silly => "silly",
        }
    }

    fn index(self) -> u8 {
        self as u8
    }

    fn from_index(index: u8) -> Self {
        Self::ALL
            .get(index as usize)
            .copied()
            .unwrap_or_default()
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = VoxError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                VoxError::configuration(format!(
                    "unknown log level '{}' (expected error, warn, info, verbose, debug or silly)",
                    s
                ))
            })
    }
}

/// Label written into the `[level]` column.
fn label(level: Level) -> &'static str {
    match level {
        Level::Error => "error",
        Level::Warn => "warn",
        Level::Info => "info",
        Level::Debug => "debug",
        Level::Trace => "silly",
    }
}

/// A formatted record, as forwarded to other processes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub dir: PathBuf,
    /// Device tag embedded in the file name.
    pub tag: String,
    pub level: LogLevel,
    pub max_file_bytes: u64,
    /// Echo every line to stderr.
    pub console: bool,
}

impl LogSettings {
    pub fn new(dir: impl Into<PathBuf>, tag: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            tag: tag.into(),
            level: LogLevel::default(),
            max_file_bytes: defaults::LOG_MAX_FILE_BYTES,
            console: false,
        }
    }

    /// `<data_dir>/voxdesk/logs`.
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join(defaults::APP_DIR).join("logs"))
    }
}

struct OpenFile {
    date: String,
    file: File,
    size: u64,
}

pub struct FileLogger {
    dir: PathBuf,
    tag: String,
    max_file_bytes: u64,
    console: bool,
    level: AtomicU8,
    current: Mutex<Option<OpenFile>>,
    forward: Option<Sender<LogRecord>>,
}

impl FileLogger {
    pub fn new(settings: LogSettings) -> Self {
        Self {
            dir: settings.dir,
            tag: settings.tag,
            max_file_bytes: settings.max_file_bytes,
            console: settings.console,
            level: AtomicU8::new(settings.level.index()),
            current: Mutex::new(None),
            forward: None,
        }
    }

    /// Send a copy of every record written to the file.
    pub fn with_forwarding(mut self, tx: Sender<LogRecord>) -> Self {
        self.forward = Some(tx);
        self
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_index(self.level.load(Ordering::SeqCst))
    }

    /// Change the file level at runtime.
    pub fn change_level(&self, level: LogLevel) {
        self.level.store(level.index(), Ordering::SeqCst);
        log::set_max_level(level.to_level_filter());
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file written for `date`.
    pub fn file_path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(file_name(&date.format(DATE_FORMAT).to_string(), &self.tag, false))
    }

    /// Path of today's log file.
    pub fn current_path(&self) -> PathBuf {
        self.file_path_for(Local::now().date_naive())
    }

    /// Format and append one line stamped with `now`.
    pub fn write_at(&self, now: NaiveDateTime, level: Level, target: &str, message: &str) -> Result<()> {
        let timestamp = now.format(LINE_TIME_FORMAT).to_string();
        let line = format!("[{}] [{}] {}\n", timestamp, label(level), message);
        let date = now.date().format(DATE_FORMAT).to_string();

        {
            let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
            let stale = current.as_ref().is_none_or(|open| open.date != date);
            if stale {
                *current = Some(self.open_file(&date)?);
            }
            let needs_rotation = current.as_ref().is_some_and(|open| {
                open.size > 0 && open.size + line.len() as u64 > self.max_file_bytes
            });
            if needs_rotation {
                // Close before moving the file aside.
                *current = None;
                self.rotate(&date)?;
                *current = Some(self.open_file(&date)?);
            }
            if let Some(open) = current.as_mut() {
                open.file.write_all(line.as_bytes())?;
                open.size += line.len() as u64;
            }
        }

        if self.console {
            eprint!("{}", line);
        }
        if let Some(tx) = &self.forward {
            let _ = tx.try_send(LogRecord {
                timestamp,
                level: label(level).to_string(),
                target: target.to_string(),
                message: message.to_string(),
            });
        }
        Ok(())
    }

    fn open_file(&self, date: &str) -> Result<OpenFile> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name(date, &self.tag, false));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(OpenFile {
            date: date.to_string(),
            file,
            size,
        })
    }

    fn rotate(&self, date: &str) -> Result<()> {
        let active = self.dir.join(file_name(date, &self.tag, false));
        let old = self.dir.join(file_name(date, &self.tag, true));
        std::fs::rename(&active, &old)?;
        Ok(())
    }
}

impl Log for FileLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level().to_level_filter()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let message = record.args().to_string();
        if let Err(e) = self.write_at(
            Local::now().naive_local(),
            record.level(),
            record.target(),
            &message,
        ) {
            eprintln!("voxdesk: failed to write log: {e}");
        }
    }

    fn flush(&self) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(open) = current.as_mut() {
            let _ = open.file.flush();
        }
    }
}

fn file_name(date: &str, tag: &str, old: bool) -> String {
    if old {
        format!("{}-[{}].old.log", date, tag)
    } else {
        format!("{}-[{}].log", date, tag)
    }
}

struct GlobalLogger(Arc<FileLogger>);

impl Log for GlobalLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.0.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        self.0.log(record)
    }

    fn flush(&self) {
        self.0.flush()
    }
}

static GLOBAL: OnceLock<GlobalLogger> = OnceLock::new();

/// Register `logger` as the process-wide `log` backend. Only the first call
/// succeeds.
pub fn install(logger: Arc<FileLogger>) -> Result<()> {
    let level = logger.level();
    if GLOBAL.set(GlobalLogger(logger)).is_err() {
        return Err(VoxError::Other("logger already installed".to_string()));
    }
    let Some(global) = GLOBAL.get() else {
        return Err(VoxError::Other("logger already installed".to_string()));
    };
    log::set_logger(global).map_err(|e| VoxError::Other(e.to_string()))?;
    log::set_max_level(level.to_level_filter());
    Ok(())
}

/// Delete log files whose leading date is before `today - retention_days`.
/// Files without a date prefix are left alone.
pub fn prune_old_logs(dir: &Path, retention_days: u32, today: NaiveDate) -> Result<Vec<PathBuf>> {
    let threshold = today
        .checked_sub_days(Days::new(u64::from(retention_days)))
        .unwrap_or(NaiveDate::MIN);
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut removed = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(prefix) = name.to_str().and_then(|n| n.get(..10)) else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(prefix, DATE_FORMAT) else {
            continue;
        };
        if date < threshold {
            let path = entry.path();
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    log::info!("Removed old log file {}", path.display());
                    removed.push(path);
                }
                Err(e) => log::error!("Failed to remove log file {}: {}", path.display(), e),
            }
        }
    }
    removed.sort();
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(date: &str, time: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S%.3f").unwrap()
    }

    fn logger(dir: &TempDir) -> FileLogger {
        FileLogger::new(LogSettings::new(dir.path(), "abc123"))
    }

    #[test]
    fn test_line_format_and_file_name() {
        let dir = TempDir::new().unwrap();
        let l = logger(&dir);
        l.write_at(at("2024-05-01", "09:30:12.045"), Level::Info, "t", "hello")
            .unwrap();

        let path = dir.path().join("2024-05-01-[abc123].log");
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "[2024-05-01 09:30:12.045] [info] hello\n");
        assert_eq!(
            l.file_path_for(NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()),
            path
        );
    }

    #[test]
    fn test_trace_is_labelled_silly() {
        let dir = TempDir::new().unwrap();
        let l = logger(&dir);
        l.write_at(at("2024-05-01", "00:00:00.000"), Level::Trace, "t", "x")
            .unwrap();
        let content = std::fs::read_to_string(dir.path().join("2024-05-01-[abc123].log")).unwrap();
        assert!(content.contains("[silly] x"));
    }

    #[test]
    fn test_date_change_switches_file() {
        let dir = TempDir::new().unwrap();
        let l = logger(&dir);
        l.write_at(at("2024-05-01", "23:59:59.999"), Level::Info, "t", "a")
            .unwrap();
        l.write_at(at("2024-05-02", "00:00:00.001"), Level::Info, "t", "b")
            .unwrap();
        assert!(dir.path().join("2024-05-01-[abc123].log").exists());
        assert!(dir.path().join("2024-05-02-[abc123].log").exists());
    }

    #[test]
    fn test_oversized_file_is_moved_aside() {
        let dir = TempDir::new().unwrap();
        let mut settings = LogSettings::new(dir.path(), "abc123");
        settings.max_file_bytes = 60;
        let l = FileLogger::new(settings);
        let now = at("2024-05-01", "10:00:00.000");
        l.write_at(now, Level::Info, "t", "first line").unwrap();
        l.write_at(now, Level::Info, "t", "second line").unwrap();

        let old = std::fs::read_to_string(dir.path().join("2024-05-01-[abc123].old.log")).unwrap();
        let active = std::fs::read_to_string(dir.path().join("2024-05-01-[abc123].log")).unwrap();
        assert!(old.contains("first line"));
        assert!(active.contains("second line"));
        assert!(!active.contains("first line"));
    }

    #[test]
    fn test_level_filtering_and_change() {
        let dir = TempDir::new().unwrap();
        let l = logger(&dir);
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(!l.enabled(&debug));
        l.change_level(LogLevel::Verbose);
        assert_eq!(l.level(), LogLevel::Verbose);
        assert!(l.enabled(&debug));
        let trace = Metadata::builder().level(Level::Trace).build();
        assert!(!l.enabled(&trace));
    }

    #[test]
    fn test_forwarding() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = crossbeam_channel::unbounded();
        let l = logger(&dir).with_forwarding(tx);
        l.write_at(at("2024-05-01", "10:00:00.000"), Level::Warn, "voxdesk::ipc", "careful")
            .unwrap();
        let record = rx.try_recv().unwrap();
        assert_eq!(record.level, "warn");
        assert_eq!(record.target, "voxdesk::ipc");
        assert_eq!(record.message, "careful");
        assert_eq!(record.timestamp, "2024-05-01 10:00:00.000");
    }

    #[test]
    fn test_prune_old_logs() {
        let dir = TempDir::new().unwrap();
        for name in [
            "2024-04-01-[abc].log",
            "2024-04-15-[abc].old.log",
            "2024-04-16-[abc].log",
            "2024-05-01-[abc].log",
            "notes.txt",
        ] {
            std::fs::write(dir.path().join(name), "x").unwrap();
        }
        let today = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let removed = prune_old_logs(dir.path(), 15, today).unwrap();

        assert_eq!(
            removed,
            vec![
                dir.path().join("2024-04-01-[abc].log"),
                dir.path().join("2024-04-15-[abc].old.log"),
            ]
        );
        assert!(dir.path().join("2024-04-16-[abc].log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_prune_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let removed = prune_old_logs(&dir.path().join("nope"), 15, Local::now().date_naive()).unwrap();
        assert!(removed.is_empty());
    }

    #[test]
    fn test_log_level_parse() {
        assert_eq!("Verbose".parse::<LogLevel>().unwrap(), LogLevel::Verbose);
        assert_eq!("silly".parse::<LogLevel>().unwrap(), LogLevel::Silly);
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Silly.to_level_filter(), LevelFilter::Trace);
        let json = serde_json::to_string(&LogLevel::Warn).unwrap();
        assert_eq!(json, r#""warn""#);
    }
}

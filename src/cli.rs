//! Command-line interface for voxdesk
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Desktop host for streaming speech recognition
#[derive(Parser, Debug)]
#[command(
    name = "voxdesk",
    version,
    about = "Desktop host for streaming speech recognition"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress partial results and status messages
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: echo info log to stderr, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Recognize speech from the microphone until Ctrl-C
    Listen {
        /// Audio input device (see `voxdesk devices`)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Model file (overrides recognizer.model.model_path)
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,

        /// Language hint, e.g. auto, en, zh
        #[arg(long, value_name = "LANG")]
        language: Option<String>,
    },

    /// Decode a mono 16-bit WAV file ("-" reads stdin)
    Decode {
        /// WAV file to decode
        file: PathBuf,

        /// Model file (overrides recognizer.model.model_path)
        #[arg(long, value_name = "PATH")]
        model: Option<PathBuf>,

        /// Language hint, e.g. auto, en, zh
        #[arg(long, value_name = "LANG")]
        language: Option<String>,

        /// Seconds of silence appended after the audio
        #[arg(long, value_name = "SECONDS")]
        tail_padding: Option<f32>,
    },

    /// List available audio input devices
    Devices,

    /// Run the IPC host in the foreground
    Serve {
        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxdesk.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Send one JSON request to a running host and print the reply
    Invoke {
        /// Request, e.g. '{"channel":"store-get","key":"theme"}'
        request: String,

        /// Path to Unix socket (default: $XDG_RUNTIME_DIR/voxdesk.sock)
        #[arg(long, value_name = "PATH")]
        socket: Option<PathBuf>,
    },

    /// Read and write the local key-value store
    Store {
        #[command(subcommand)]
        action: StoreAction,
    },

    /// Inspect and prune log files
    Logs {
        #[command(subcommand)]
        action: LogsAction,
    },

    /// View configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Store actions
#[derive(Subcommand, Debug)]
pub enum StoreAction {
    /// Print a value as JSON
    Get { key: String },
    /// Store a value; parsed as JSON, or kept as a string if it is not JSON
    Set {
        key: String,
        value: String,
        /// Lifetime in days
        #[arg(long, value_name = "DAYS")]
        expires: Option<f64>,
        /// Delete the value on first read
        #[arg(long)]
        once: bool,
    },
    /// Delete a key
    Remove { key: String },
    /// Print every stored entry with its metadata
    All,
}

/// Log actions
#[derive(Subcommand, Debug)]
pub enum LogsAction {
    /// Print today's log file path
    Path,
    /// Delete log files older than the retention window
    Prune {
        /// Override log.retention_days
        #[arg(long, value_name = "DAYS")]
        days: Option<u32>,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

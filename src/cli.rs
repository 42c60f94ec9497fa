//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, health), and their associated argument structs.
//! Every `run` flag has an environment variable equivalent; in container
//! deployments the proxy is configured from the environment alone.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "teeproxy",
    version,
    about = "Transparent reverse proxy that records every exchange",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        TARGET_URL=http://localhost:8080 teeproxy run     Proxy :3000 to :8080\n  \
        teeproxy health http://localhost:3000/_health     Probe a running instance"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Run(Box<RunArgs>),

    /// Check health of a running instance
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        teeproxy run --target-url http://backend:8080                 Default capture log\n  \
        teeproxy run --target-url http://backend:8080 --pretty        Local dev mode\n  \
        LOG_FILE=/var/log/tee/record.log teeproxy run                 Environment only")]
pub struct RunArgs {
    /// Upstream origin every request is forwarded to
    #[arg(long, env = "TARGET_URL")]
    pub target_url: String,

    /// Listen port
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Listen address
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Serve local health JSON on this path instead of forwarding it
    #[arg(long, env = "HEALTH_PATH")]
    pub health_path: Option<String>,

    // -- Capture --
    /// Capture log file
    #[arg(
        long,
        env = "LOG_FILE",
        default_value = "logs/record.log",
        help_heading = "Capture"
    )]
    pub log_file: PathBuf,

    /// Rotate the capture log once it reaches this many bytes
    #[arg(
        long,
        env = "LOG_ROTATION_BYTES",
        default_value_t = 104_857_600,
        help_heading = "Capture"
    )]
    pub log_rotation_bytes: u64,

    /// Delete rotated capture logs older than this many days
    #[arg(
        long,
        env = "LOG_RETENTION_DAYS",
        default_value_t = 10,
        help_heading = "Capture"
    )]
    pub log_retention_days: u64,

    /// Capture queue capacity; records past it are dropped with a warning
    #[arg(
        long,
        env = "CAPTURE_QUEUE_CAPACITY",
        default_value_t = 1024,
        help_heading = "Capture"
    )]
    pub capture_queue: usize,

    /// Largest response body captured in full, in bytes
    #[arg(
        long,
        env = "CAPTURE_MAX_BODY_BYTES",
        default_value_t = 16_777_216,
        help_heading = "Capture"
    )]
    pub capture_max_body: usize,

    /// Time allowed to flush queued records at shutdown, in milliseconds
    #[arg(
        long,
        env = "CAPTURE_DRAIN_TIMEOUT_MS",
        default_value_t = 5000,
        help_heading = "Capture"
    )]
    pub drain_timeout: u64,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Tuning --
    /// End-to-end upstream timeout in milliseconds
    #[arg(
        long,
        env = "REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        help_heading = "Tuning"
    )]
    pub timeout: u64,

    /// Fail a response whose next chunk takes longer than this (milliseconds)
    #[arg(long, env = "CHUNK_IDLE_TIMEOUT_MS", help_heading = "Tuning")]
    pub chunk_idle_timeout: Option<u64>,

    /// Reject request bodies larger than this many bytes (unlimited when unset)
    #[arg(long, env = "MAX_BODY_SIZE", help_heading = "Tuning")]
    pub max_body: Option<usize>,

    /// Idle upstream connections kept in the pool
    #[arg(
        long,
        env = "POOL_MAX_IDLE",
        default_value_t = 32,
        help_heading = "Tuning"
    )]
    pub pool_max_idle: usize,

    /// Strip hop-by-hop headers before forwarding
    #[arg(long, env = "STRIP_HOP_BY_HOP", help_heading = "Tuning")]
    pub strip_hop_by_hop: bool,
}

#[derive(Args)]
pub struct HealthArgs {
    /// Health URL of the running instance
    #[arg(default_value = "http://localhost:3000/_health")]
    pub url: String,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Load `KEY=value` lines from an env file into the process environment.
///
/// Variables that are already set keep their values. A missing file is not
/// an error; an unreadable or malformed one is reported and skipped.
/// Returns whether the file was loaded.
pub fn load_env_file(path: &Path) -> bool {
    match dotenvy::from_path(path) {
        Ok(()) => true,
        Err(e) if e.not_found() => false,
        Err(e) => {
            eprintln!("Warning: ignoring {}: {e}", path.display());
            false
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

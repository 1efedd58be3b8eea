//! # Logging Utilities
//!
//! Logging infrastructure for Cinder using `tracing`.
//!
//! This module provides structured logging with support for:
//! - Pretty (development) or JSON output
//! - Environment variable configuration
//! - Log level filtering with `EnvFilter` directives
//! - An optional log file next to the console output
//!
//! Console output always goes to **stderr**: stdout belongs to the debugger's
//! command output and to the debuggee.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cinder_utils::init_logging;
//!
//! // Initialize with default settings (reads RUST_LOG and CINDER_LOG_*)
//! init_logging().expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Filter directives (e.g., `RUST_LOG=debug`, `RUST_LOG=cinder_core=trace`)
//! - `CINDER_LOG_FORMAT`: Output format (`json` or `pretty`, default: `pretty`)
//! - `CINDER_LOG_FILE`: Optional log file; if it names a directory, a dated
//!   `YYYY-MM-DD-cinder.log` is created inside it
//!
//! ## Filter Priority
//!
//! 1. An explicit level (from `--log-level`)
//! 2. `RUST_LOG`
//! 3. `warn`, so an interactive session stays quiet by default

use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::OnceLock;
use std::{env, fs};

use chrono::Utc;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::ChronoUtc;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

/// Environment variable selecting the output format.
pub const FORMAT_ENV: &str = "CINDER_LOG_FORMAT";
/// Environment variable naming the log file.
pub const FILE_ENV: &str = "CINDER_LOG_FILE";

/// Level used when neither an explicit level nor `RUST_LOG` is given.
const DEFAULT_LEVEL: Level = Level::WARN;

/// Keeps the non-blocking file writer flushing for the life of the process.
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat
{
    /// Pretty-printed, human-readable format (default)
    #[default]
    Pretty,
    /// JSON lines, for collecting logs from scripted runs
    Json,
}

impl FromStr for LogFormat
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "pretty" | "dev" | "development" => Ok(LogFormat::Pretty),
            "json" | "prod" | "production" => Ok(LogFormat::Json),
            _ => Err(LoggingError::InvalidFormat(format!("{s} (use 'pretty' or 'json')"))),
        }
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel
{
    /// Error level
    Error,
    /// Warning level (default)
    Warn,
    /// Info level: launches, breakpoints set and hit, exits
    Info,
    /// Debug level: every patch and stop
    Debug,
    /// Trace level: every word read and written
    Trace,
}

impl From<LogLevel> for Level
{
    fn from(level: LogLevel) -> Self
    {
        match level {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

impl FromStr for LogLevel
{
    type Err = LoggingError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "error" | "err" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" | "dbg" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(LoggingError::InvalidLevel(format!(
                "{s} (use 'error', 'warn', 'info', 'debug', or 'trace')"
            ))),
        }
    }
}

/// Resolved logging settings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoggingConfig
{
    /// Explicit level; overrides `RUST_LOG` when set
    pub level: Option<LogLevel>,
    /// Console and file format
    pub format: LogFormat,
    /// Log file (or directory for a dated file)
    pub file: Option<PathBuf>,
}

impl LoggingConfig
{
    /// Settings from `CINDER_LOG_FORMAT` and `CINDER_LOG_FILE`.
    ///
    /// An unparseable format falls back to pretty output.
    #[must_use]
    pub fn from_env() -> Self
    {
        Self {
            level: None,
            format: env::var(FORMAT_ENV)
                .ok()
                .and_then(|s| LogFormat::from_str(&s).ok())
                .unwrap_or_default(),
            file: env::var_os(FILE_ENV).filter(|value| !value.is_empty()).map(PathBuf::from),
        }
    }

    /// Override the level.
    #[must_use]
    pub fn with_level(mut self, level: Option<LogLevel>) -> Self
    {
        if level.is_some() {
            self.level = level;
        }
        self
    }

    /// Override the format.
    #[must_use]
    pub fn with_format(mut self, format: Option<LogFormat>) -> Self
    {
        if let Some(format) = format {
            self.format = format;
        }
        self
    }

    /// Filter directives this configuration resolves to, given the value of
    /// `RUST_LOG`.
    #[must_use]
    pub fn filter_directives(&self, rust_log: Option<&str>) -> String
    {
        match (self.level, rust_log) {
            (Some(level), _) => Level::from(level).to_string().to_lowercase(),
            (None, Some(directives)) if !directives.trim().is_empty() => directives.to_string(),
            _ => DEFAULT_LEVEL.to_string().to_lowercase(),
        }
    }

    fn env_filter(&self) -> EnvFilter
    {
        let rust_log = env::var("RUST_LOG").ok();
        let directives = self.filter_directives(rust_log.as_deref());
        EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL.to_string()))
    }
}

/// Initialize logging from the environment
///
/// ## Errors
///
/// Returns an error if:
/// - A global subscriber is already installed
/// - The log file cannot be created (if `CINDER_LOG_FILE` is set)
pub fn init_logging() -> Result<(), LoggingError>
{
    init(&LoggingConfig::from_env())
}

/// Initialize logging with explicit level and format
///
/// `CINDER_LOG_FILE` is still honoured.
///
/// ## Example
///
/// ```rust,no_run
/// use cinder_utils::{LogFormat, LogLevel, init_logging_with_level};
///
/// init_logging_with_level(LogLevel::Debug, LogFormat::Pretty)
///     .expect("Failed to initialize logging");
/// ```
///
/// ## Errors
///
/// As [`init_logging`].
pub fn init_logging_with_level(level: LogLevel, format: LogFormat) -> Result<(), LoggingError>
{
    init(
        &LoggingConfig::from_env()
            .with_level(Some(level))
            .with_format(Some(format)),
    )
}

/// Install the global subscriber described by `config`.
///
/// ## Errors
///
/// As [`init_logging`].
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError>
{
    let mut layers: Vec<BoxedLayer> = Vec::with_capacity(2);
    layers.push(build_layer(
        config.format,
        io::stderr,
        io::stderr().is_terminal(),
        config.env_filter(),
    ));

    let mut log_path = None;
    if let Some(requested) = &config.file {
        let path = resolve_log_file(requested)?;
        let directory = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let file_name = path
            .file_name()
            .ok_or_else(|| LoggingError::InvalidFile(path.display().to_string()))?;
        let appender = tracing_appender::rolling::never(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        if FILE_GUARD.set(guard).is_err() {
            return Err(LoggingError::InitializationFailed(
                "file logging is already initialized".to_string(),
            ));
        }
        layers.push(build_layer(config.format, non_blocking, false, config.env_filter()));
        log_path = Some(path);
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|err| LoggingError::InitializationFailed(err.to_string()))?;

    if let Some(path) = log_path {
        tracing::debug!(path = %path.display(), "logging to file");
    }
    Ok(())
}

/// Console or file layer in the requested format.
fn build_layer<W>(format: LogFormat, writer: W, ansi: bool, filter: EnvFilter) -> BoxedLayer
where
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    match format {
        LogFormat::Pretty => fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(ansi)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_timer(ChronoUtc::rfc_3339())
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(writer)
            .with_filter(filter)
            .boxed(),
    }
}

/// A directory gets a dated `YYYY-MM-DD-cinder.log` inside it; anything else
/// is used as the file path, creating its parent directory if needed.
fn resolve_log_file(requested: &Path) -> Result<PathBuf, LoggingError>
{
    if requested.is_dir() {
        return Ok(requested.join(dated_file_name()));
    }
    if let Some(parent) = requested.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(requested.to_path_buf())
}

fn dated_file_name() -> String
{
    format!("{}-cinder.log", Utc::now().format("%Y-%m-%d"))
}

/// Logging initialization error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError
{
    /// Invalid log format
    #[error("Invalid log format: {0}")]
    InvalidFormat(String),

    /// Invalid log level
    #[error("Invalid log level: {0}")]
    InvalidLevel(String),

    /// The log file path has no file name
    #[error("Invalid log file: {0}")]
    InvalidFile(String),

    /// Failed to initialize logging
    #[error("Failed to initialize logging: {0}")]
    InitializationFailed(String),

    /// File logging error
    #[error("File logging error: {0}")]
    FileError(#[from] io::Error),
}

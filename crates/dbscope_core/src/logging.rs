//! Structured logging setup with console and file output.
//!
//! Logs go to stderr so stdout stays clean for results. When stderr is not a
//! terminal, a daily rolling file in the data directory receives everything
//! and stderr only gets warnings. The filter comes from, in order, the
//! configured filter, `DBSCOPE_LOG`, `RUST_LOG`, then the build-type default.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
pub const LOG_ENV_VAR: &str = "DBSCOPE_LOG";

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Whether stderr is a terminal
    pub is_tty: bool,
    /// Optional custom log filter
    pub log_filter: Option<String>,
}

impl LogConfig {
    /// Create a new logging configuration.
    pub fn new(log_dir: PathBuf) -> Self {
        Self { log_dir, is_tty: atty::is(atty::Stream::Stderr), log_filter: None }
    }

    /// Set custom log filter.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    /// Force console-only logging.
    pub fn console_only(mut self) -> Self {
        self.is_tty = true;
        self
    }
}

/// Guard that must be held for the lifetime of the program.
///
/// Dropping this guard flushes pending log entries.
pub struct LoggingGuard {
    _worker_guard: Option<WorkerGuard>,
}

/// Initialize logging with the given configuration.
///
/// Falls back to console-only logging when the log file cannot be opened.
pub fn init_logging(config: LogConfig) -> LoggingGuard {
    if config.is_tty {
        return init_console_logging(config.log_filter.as_deref());
    }

    match init_file_logging(&config) {
        Ok(guard) => LoggingGuard { _worker_guard: Some(guard) },
        Err(e) => {
            eprintln!("Warning: Failed to initialize file logging: {}. Using console only.", e);
            init_console_logging(config.log_filter.as_deref())
        }
    }
}

/// Initialize with defaults.
pub fn init_logging_default() -> LoggingGuard {
    init_logging(LogConfig::new(log_dir()))
}

fn init_console_logging(filter: Option<&str>) -> LoggingGuard {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(build_env_filter(filter))
        .with_ansi(true)
        .with_target(false)
        .with_thread_ids(false)
        .try_init();

    LoggingGuard { _worker_guard: None }
}

fn init_file_logging(
    config: &LogConfig,
) -> Result<WorkerGuard, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(&config.log_dir)?;

    let file_appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("dbscope")
        .filename_suffix("log")
        .build(&config.log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stderr = std::io::stderr.with_max_level(tracing::Level::WARN);
    let combined = stderr.and(non_blocking);

    tracing_subscriber::fmt()
        .with_writer(combined)
        .with_env_filter(build_env_filter(config.log_filter.as_deref()))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .try_init()?;

    Ok(guard)
}

fn build_env_filter(custom_filter: Option<&str>) -> EnvFilter {
    if let Some(filter) = custom_filter {
        return EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(default_log_filter()));
    }

    EnvFilter::try_from_env(LOG_ENV_VAR)
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter()))
}

/// Get the default log filter based on build type.
pub fn default_log_filter() -> &'static str {
    #[cfg(debug_assertions)]
    {
        "info,dbscope=debug,dbscope_core=debug,tokio_postgres=warn,deadpool=warn"
    }
    #[cfg(not(debug_assertions))]
    {
        "warn,dbscope=info,dbscope_core=info,tokio_postgres=warn,deadpool=warn"
    }
}

/// Get the application data directory.
///
/// Platform data-local directory joined with `dbscope`, or the current
/// directory when the platform has none.
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("dbscope")
}

/// Get the default log directory.
pub fn log_dir() -> PathBuf {
    data_dir().join("logs")
}

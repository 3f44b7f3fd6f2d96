use crate::config::LoggingConfig;
use crate::models::StatsSnapshot;
use anyhow::{Context, Result};
use log::{debug, error, info, trace, warn};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_log::LogTracer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Initialize console logging plus the durable log file.
///
/// Returns the file writer guard when file logging is enabled; the caller
/// must keep it alive for buffered records to be flushed on exit.
pub fn init_logger_with_config(log_level: &str, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_new(log_level)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("Failed to build log filter")?;

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .with_ansi(true);

    let (file_layer, guard) = if logging.enable_file_logging {
        let path = Path::new(&logging.log_file);
        let directory = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .with_context(|| format!("Invalid log file path: {}", logging.log_file))?;

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .with_writer(writer)
            .with_target(false)
            .with_ansi(false);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(console_layer)
        .with(file_layer);

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;

    // Initialize LogTracer to bridge log events to tracing (after subscriber is set up)
    if let Err(e) = LogTracer::init() {
        eprintln!("Warning: Failed to initialize LogTracer: {:?}", e);
    }

    Ok(guard)
}

/// Log a periodic stats snapshot
pub fn log_stats(snapshot: &StatsSnapshot) {
    info!(
        "Stats - Total requests: {}, Active connections: {}, Errors: {}, Rejected: {}",
        snapshot.total_requests, snapshot.active_connections, snapshot.errors, snapshot.rejected
    );

    if let Ok(json) = serde_json::to_string(snapshot) {
        debug!("STATS SNAPSHOT: {}", json);
    }
}

/// Log an error message
pub fn log_error(message: &str) {
    error!("{}", message);
}

/// Log an info message
pub fn log_info(message: &str) {
    info!("{}", message);
}

/// Log a warning message
pub fn log_warning(message: &str) {
    warn!("{}", message);
}

/// Log a debug message
pub fn log_debug(message: &str) {
    debug!("{}", message);
}

/// Log a trace message
pub fn log_trace(message: &str) {
    trace!("{}", message);
}

/// Convenience macro for logging errors
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::log_error(&format!($($arg)*));
    };
}

/// Convenience macro for logging info messages
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::log_info(&format!($($arg)*));
    };
}

/// Convenience macro for logging warning messages
#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::logging::log_warning(&format!($($arg)*));
    };
}

/// Convenience macro for logging debug messages
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::log_debug(&format!($($arg)*));
    };
}

/// Convenience macro for logging trace messages
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        $crate::logging::log_trace(&format!($($arg)*));
    };
}

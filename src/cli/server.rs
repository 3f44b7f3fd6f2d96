//! Server command-line options

use crate::config::settings::ProxyConfig;
use clap::Args;
use tracing::debug;

/// Flags overriding the file and environment configuration
#[derive(Debug, Default, Args)]
pub struct ServerArgs {
    /// Host to bind the proxy listener to
    #[arg(long)]
    pub bind_host: Option<String>,

    /// Port to bind the proxy listener to
    #[arg(long)]
    pub bind_port: Option<u16>,

    /// Maximum number of connections handled concurrently
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Accepted connections allowed to wait for a worker
    #[arg(long)]
    pub queue_capacity: Option<usize>,

    /// I/O buffer size in bytes
    #[arg(long)]
    pub buffer_size: Option<usize>,

    /// Listen backlog
    #[arg(long)]
    pub backlog: Option<u32>,

    /// Client read timeout in seconds
    #[arg(long)]
    pub client_read_timeout: Option<u64>,

    /// Upstream connect timeout in seconds
    #[arg(long)]
    pub connect_timeout: Option<u64>,

    /// Stats report interval in seconds (0 disables)
    #[arg(long)]
    pub stats_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path of the durable log file
    #[arg(long)]
    pub log_file: Option<String>,

    /// Log to the console only
    #[arg(long)]
    pub no_file_log: bool,
}

impl ServerArgs {
    /// Apply the flags that were given on top of `config`
    pub fn apply_to(&self, config: &mut ProxyConfig) {
        if let Some(host) = &self.bind_host {
            config.bind_host = host.clone();
        }
        if let Some(port) = self.bind_port {
            config.bind_port = port;
        }
        if let Some(workers) = self.max_workers {
            config.max_workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(backlog) = self.backlog {
            config.backlog = backlog;
        }
        if let Some(timeout) = self.client_read_timeout {
            config.client_read_timeout_secs = timeout;
        }
        if let Some(timeout) = self.connect_timeout {
            config.upstream_connect_timeout_secs = timeout;
        }
        if let Some(interval) = self.stats_interval {
            config.stats_interval_secs = interval;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(log_file) = &self.log_file {
            config.logging.log_file = log_file.clone();
        }
        if self.no_file_log {
            config.logging.enable_file_logging = false;
        }

        debug!("ProxyConfig after CLI overrides: {:?}", config);
    }
}

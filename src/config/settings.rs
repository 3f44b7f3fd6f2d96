//! Proxy server configuration settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Default configuration file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.yml";

/// Main configuration for the proxy server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Host the listener binds to
    pub bind_host: String,

    /// Port the listener binds to (0 picks an ephemeral port)
    pub bind_port: u16,

    /// Number of worker tasks handling connections concurrently
    pub max_workers: usize,

    /// Accepted connections allowed to wait for a free worker
    pub queue_capacity: usize,

    /// Size of the initial read and of each relay chunk, in bytes
    pub buffer_size: usize,

    /// Listen backlog passed to the OS
    pub backlog: u32,

    /// Timeout for the first client read, in seconds
    pub client_read_timeout_secs: u64,

    /// Timeout for opening the upstream connection, in seconds
    pub upstream_connect_timeout_secs: u64,

    /// Relay readiness wait interval, in milliseconds
    pub relay_poll_interval_ms: u64,

    /// Stats report period in seconds (0 disables reporting)
    pub stats_interval_secs: u64,

    /// Log level configuration
    pub log_level: String,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Runtime configuration
    pub runtime: RuntimeConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable file logging (default: true)
    pub enable_file_logging: bool,

    /// Path of the durable log file
    pub log_file: String,
}

/// Runtime configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of tokio worker threads (None = auto-detect CPU cores)
    pub worker_threads: Option<usize>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 8888,
            max_workers: 200,
            queue_capacity: 1000,
            buffer_size: 16384,
            backlog: 1000,
            client_read_timeout_secs: 30,
            upstream_connect_timeout_secs: 10,
            relay_poll_interval_ms: 1000,
            stats_interval_secs: 10,
            log_level: "info".to_string(),
            logging: LoggingConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enable_file_logging: true,
            log_file: "proxy.log".to_string(),
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: ProxyConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load configuration from an explicit YAML file, or from `config.yml`
    /// when present, then apply environment variable overrides.
    ///
    /// An explicitly named file must exist; the default file is optional.
    pub fn load_config(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_yaml_file(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_yaml_file(DEFAULT_CONFIG_FILE)?
            }
            None => Self::default(),
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());

        Ok(config)
    }

    /// Override fields from environment-style variables.
    ///
    /// Takes a lookup function so callers (and tests) can supply their own
    /// source. Values that fail to parse are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(value: Option<String>) -> Option<T> {
            value.and_then(|v| v.trim().parse().ok())
        }

        if let Some(host) = lookup("PROXY_BIND_HOST") {
            self.bind_host = host;
        }
        if let Some(port) = parsed(lookup("PROXY_BIND_PORT")) {
            self.bind_port = port;
        }
        if let Some(workers) = parsed(lookup("PROXY_MAX_WORKERS")) {
            self.max_workers = workers;
        }
        if let Some(capacity) = parsed(lookup("PROXY_QUEUE_CAPACITY")) {
            self.queue_capacity = capacity;
        }
        if let Some(size) = parsed(lookup("PROXY_BUFFER_SIZE")) {
            self.buffer_size = size;
        }
        if let Some(backlog) = parsed(lookup("PROXY_BACKLOG")) {
            self.backlog = backlog;
        }
        if let Some(timeout) = parsed(lookup("PROXY_CLIENT_READ_TIMEOUT")) {
            self.client_read_timeout_secs = timeout;
        }
        if let Some(timeout) = parsed(lookup("PROXY_CONNECT_TIMEOUT")) {
            self.upstream_connect_timeout_secs = timeout;
        }
        if let Some(interval) = parsed(lookup("PROXY_RELAY_POLL_INTERVAL_MS")) {
            self.relay_poll_interval_ms = interval;
        }
        if let Some(interval) = parsed(lookup("PROXY_STATS_INTERVAL")) {
            self.stats_interval_secs = interval;
        }
        if let Some(log_level) = lookup("RUST_LOG") {
            self.log_level = log_level;
        }
        if let Some(enable) = lookup("PROXY_ENABLE_FILE_LOGGING") {
            self.logging.enable_file_logging = enable.to_lowercase() == "true";
        }
        if let Some(log_file) = lookup("PROXY_LOG_FILE") {
            self.logging.log_file = log_file;
        }
        if let Some(threads) = parsed(lookup("PROXY_WORKER_THREADS")) {
            self.runtime.worker_threads = Some(threads);
        }
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let checks: [(&str, bool); 7] = [
            ("max_workers", self.max_workers == 0),
            ("queue_capacity", self.queue_capacity == 0),
            ("buffer_size", self.buffer_size == 0),
            ("backlog", self.backlog == 0),
            ("client_read_timeout_secs", self.client_read_timeout_secs == 0),
            ("upstream_connect_timeout_secs", self.upstream_connect_timeout_secs == 0),
            ("relay_poll_interval_ms", self.relay_poll_interval_ms == 0),
        ];

        if let Some((field, _)) = checks.iter().find(|(_, is_zero)| *is_zero) {
            return Err(crate::Error::Config(format!("{} must be greater than zero", field)));
        }

        if self.bind_host.trim().is_empty() {
            return Err(crate::Error::Config("bind_host must not be empty".to_string()));
        }

        Ok(())
    }

    /// Resolve the configured bind host and port to a socket address
    pub async fn bind_addr(&self) -> crate::Result<SocketAddr> {
        tokio::net::lookup_host((self.bind_host.as_str(), self.bind_port))
            .await?
            .next()
            .ok_or_else(|| {
                crate::Error::Config(format!(
                    "bind address {}:{} did not resolve",
                    self.bind_host, self.bind_port
                ))
            })
    }

    pub fn client_read_timeout(&self) -> Duration {
        Duration::from_secs(self.client_read_timeout_secs)
    }

    pub fn upstream_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_connect_timeout_secs)
    }

    pub fn relay_poll_interval(&self) -> Duration {
        Duration::from_millis(self.relay_poll_interval_ms)
    }

    /// Stats report period, `None` when reporting is disabled
    pub fn stats_interval(&self) -> Option<Duration> {
        (self.stats_interval_secs > 0).then(|| Duration::from_secs(self.stats_interval_secs))
    }
}

//! Configuration management for the proxy server

pub mod settings;

pub use settings::{LoggingConfig, ProxyConfig, RuntimeConfig};

//! LAN Forward Proxy - a concurrent HTTP/CONNECT forward proxy
//!
//! Plain HTTP requests are forwarded verbatim to their origin and CONNECT
//! requests are tunneled opaquely; in both cases the proxy then relays bytes
//! in both directions until either peer closes.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod proxy;
pub mod utils;

// Re-export commonly used items
pub use config::settings::ProxyConfig;
pub use error::{Error, Result};
pub use logging::{init_logger_with_config, log_debug, log_error, log_info, log_trace, log_warning};
pub use models::{ConnectionInfo, StatsSnapshot, UpstreamTarget};
pub use proxy::{ProxyServer, RunningServer};

/// Runtime utilities for building the Tokio runtime and waiting for shutdown
pub mod runtime {
    use crate::config::settings::RuntimeConfig;
    use anyhow::{Context, Result};
    use tokio::runtime::{Builder, Runtime};
    use tracing::{error, info};

    /// Create a multi-threaded Tokio runtime based on the configuration
    pub fn create_runtime(config: &RuntimeConfig) -> Result<Runtime> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all();

        match config.worker_threads {
            Some(threads) if threads > 0 => {
                info!("🧵 Initializing multi-threaded runtime with {} worker threads", threads);
                builder.worker_threads(threads);
            }
            _ => info!("🧵 Initializing multi-threaded runtime with auto-detected CPU cores"),
        }

        builder.build().context("Failed to create multi-threaded runtime")
    }

    /// Resolve on Ctrl+C or SIGTERM
    pub async fn shutdown_signal() {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => info!("Received Ctrl+C"),
            () = terminate => info!("Received SIGTERM"),
        }
    }
}

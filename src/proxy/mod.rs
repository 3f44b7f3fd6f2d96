//! Proxy server module

pub mod handler;
pub mod pool;
pub mod relay;
pub mod server;
pub mod state;
pub mod stats;
pub mod upstream;

// Re-exports
pub use handler::ConnectionHandler;
pub use pool::WorkerPool;
pub use relay::{Relay, RelayEnd, RelaySummary, Side};
pub use server::{ProxyServer, RunningServer};
pub use state::ServerState;
pub use stats::Stats;
pub use upstream::{UpstreamConnector, UpstreamLink};

//! Upstream TCP connector

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::models::UpstreamTarget;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

/// Opens single-attempt TCP connections to destination servers
#[derive(Debug, Clone, Copy)]
pub struct UpstreamConnector {
    connect_timeout: Duration,
}

impl UpstreamConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(config.upstream_connect_timeout())
    }

    /// Resolve and connect to `target`.
    ///
    /// Name resolution counts against the connect timeout. There is no retry.
    pub async fn connect(&self, target: &UpstreamTarget) -> Result<UpstreamLink> {
        let stream = tokio::time::timeout(
            self.connect_timeout,
            TcpStream::connect((target.host.as_str(), target.port)),
        )
        .await
        .map_err(|_| {
            Error::UpstreamConnection(format!(
                "connect to {} timed out after {:?}",
                target, self.connect_timeout
            ))
        })?
        .map_err(|e| Error::UpstreamConnection(format!("connect to {} failed: {}", target, e)))?;

        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        debug!("Connected to upstream {} ({})", target, peer);

        Ok(UpstreamLink {
            stream,
            target: target.clone(),
            peer,
        })
    }
}

/// An open connection to a destination server
#[derive(Debug)]
pub struct UpstreamLink {
    stream: TcpStream,
    target: UpstreamTarget,
    peer: SocketAddr,
}

impl UpstreamLink {
    pub fn target(&self) -> &UpstreamTarget {
        &self.target
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Write `bytes` to the upstream in full
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream.write_all(bytes).await.map_err(|e| {
            Error::UpstreamConnection(format!("write to {} failed: {}", self.target, e))
        })
    }

    pub fn into_stream(self) -> TcpStream {
        self.stream
    }
}

//! Bidirectional byte relay between a client and its upstream
//!
//! The relay is an unframed pipe: every chunk read from one peer is written
//! whole to the other before the next wait. EOF or an error on either side
//! ends the whole tunnel, not just one direction.

use crate::config::ProxyConfig;
use std::fmt;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

/// One end of a tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Client,
    Upstream,
}

impl Side {
    fn other(self) -> Self {
        match self {
            Side::Client => Side::Upstream,
            Side::Upstream => Side::Client,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Client => f.write_str("client"),
            Side::Upstream => f.write_str("upstream"),
        }
    }
}

/// Why a relay stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayEnd {
    /// The peer closed its write side
    Closed(Side),
    /// Reading from or writing to the peer failed
    Failed(Side),
}

/// Byte counts and termination cause of a finished relay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelaySummary {
    pub client_to_upstream: u64,
    pub upstream_to_client: u64,
    pub ended_by: RelayEnd,
}

/// Relay settings shared by every tunnel
#[derive(Debug, Clone, Copy)]
pub struct Relay {
    buffer_size: usize,
    poll_interval: Duration,
    write_timeout: Duration,
}

impl Relay {
    pub fn new(buffer_size: usize, poll_interval: Duration, write_timeout: Duration) -> Self {
        Self {
            buffer_size,
            poll_interval,
            write_timeout,
        }
    }

    pub fn from_config(config: &ProxyConfig) -> Self {
        Self::new(
            config.buffer_size,
            config.relay_poll_interval(),
            config.client_read_timeout(),
        )
    }

    /// Pump bytes between `client` and `upstream` until either side closes
    /// or fails.
    ///
    /// The upstream is shut down and dropped before returning; closing the
    /// client is left to the caller.
    pub async fn run<C, U>(&self, client: &mut C, mut upstream: U) -> RelaySummary
    where
        C: AsyncRead + AsyncWrite + Unpin,
        U: AsyncRead + AsyncWrite + Unpin,
    {
        let mut client_buf = vec![0u8; self.buffer_size];
        let mut upstream_buf = vec![0u8; self.buffer_size];
        let mut client_to_upstream = 0u64;
        let mut upstream_to_client = 0u64;

        let ended_by = loop {
            let ready = timeout(self.poll_interval, async {
                tokio::select! {
                    read = client.read(&mut client_buf) => (Side::Client, read),
                    read = upstream.read(&mut upstream_buf) => (Side::Upstream, read),
                }
            })
            .await;

            let (side, read) = match ready {
                Ok(ready) => ready,
                Err(_) => {
                    trace!("Relay idle for {:?}", self.poll_interval);
                    continue;
                }
            };

            let n = match read {
                Ok(0) => break RelayEnd::Closed(side),
                Ok(n) => n,
                Err(e) => {
                    debug!("Relay read from {} failed: {}", side, e);
                    break RelayEnd::Failed(side);
                }
            };

            let written = match side {
                Side::Client => timeout(self.write_timeout, upstream.write_all(&client_buf[..n])).await,
                Side::Upstream => timeout(self.write_timeout, client.write_all(&upstream_buf[..n])).await,
            };

            match written {
                Ok(Ok(())) => match side {
                    Side::Client => client_to_upstream += n as u64,
                    Side::Upstream => upstream_to_client += n as u64,
                },
                Ok(Err(e)) => {
                    debug!("Relay write to {} failed: {}", side.other(), e);
                    break RelayEnd::Failed(side.other());
                }
                Err(_) => {
                    debug!("Relay write to {} timed out after {:?}", side.other(), self.write_timeout);
                    break RelayEnd::Failed(side.other());
                }
            }
        };

        let _ = upstream.shutdown().await;
        drop(upstream);

        RelaySummary {
            client_to_upstream,
            upstream_to_client,
            ended_by,
        }
    }
}

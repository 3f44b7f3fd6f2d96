//! Per-connection request handling
//!
//! Reads the first chunk from the client, classifies it as a CONNECT tunnel
//! or a plain HTTP forward, opens the upstream and hands both sockets to the
//! relay. The client socket is closed and the active count released on every
//! exit path.

use crate::config::ProxyConfig;
use crate::error::{Error, Result};
use crate::log_error;
use crate::models::{ConnectionInfo, RequestKind};
use crate::proxy::relay::{Relay, RelaySummary};
use crate::proxy::stats::Stats;
use crate::proxy::upstream::UpstreamConnector;
use crate::utils::{
    elapsed_ms, log_forwarding, log_incoming_request, log_relay_finished, log_tunnel_established,
    parse_connect_target, parse_request_line, resolve_forward_target, CONNECTION_ESTABLISHED,
    INTERNAL_SERVER_ERROR,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

pub struct ConnectionHandler {
    config: Arc<ProxyConfig>,
    stats: Arc<Stats>,
    connector: UpstreamConnector,
    relay: Relay,
}

impl ConnectionHandler {
    pub fn new(config: Arc<ProxyConfig>, stats: Arc<Stats>) -> Self {
        let connector = UpstreamConnector::from_config(&config);
        let relay = Relay::from_config(&config);
        Self {
            config,
            stats,
            connector,
            relay,
        }
    }

    /// Serve one accepted client connection to completion
    pub async fn handle(&self, mut client: TcpStream, peer: SocketAddr) {
        let _active = self.stats.track_connection();
        let started = Instant::now();
        let mut info = ConnectionInfo::new(peer);

        match self.serve(&mut client, &mut info).await {
            Ok(Some(summary)) => log_relay_finished(&info, &summary, elapsed_ms(started)),
            Ok(None) => debug!("{} closed before sending a request", peer),
            Err(e) => {
                self.stats.record_error();
                log_error!("Error handling {}: {}", info.describe(), e);
            }
        }

        let _ = client.shutdown().await;
    }

    async fn serve(&self, client: &mut TcpStream, info: &mut ConnectionInfo) -> Result<Option<RelaySummary>> {
        let mut buffer = vec![0u8; self.config.buffer_size];
        let n = tokio::time::timeout(self.config.client_read_timeout(), client.read(&mut buffer)).await??;
        if n == 0 {
            return Ok(None);
        }
        buffer.truncate(n);

        self.stats.record_request();

        let request = String::from_utf8_lossy(&buffer);
        let line = parse_request_line(&request)?;
        let kind = if line.is_connect() {
            RequestKind::Tunnel
        } else {
            RequestKind::Forward
        };
        info.method = Some(line.method.clone());
        info.target = Some(line.target.clone());
        info.kind = Some(kind);
        log_incoming_request(info);

        let outcome = match kind {
            RequestKind::Tunnel => self.serve_tunnel(client, &line.target, info).await,
            RequestKind::Forward => {
                self.serve_forward(client, &buffer, &request, &line.target, info)
                    .await
            }
        };

        match outcome {
            Err(e) if !e.is_parse_failure() => {
                // Best effort; the client may already be gone
                let _ = client.write_all(INTERNAL_SERVER_ERROR).await;
                Err(e)
            }
            other => other.map(Some),
        }
    }

    async fn serve_tunnel(
        &self,
        client: &mut TcpStream,
        target: &str,
        info: &mut ConnectionInfo,
    ) -> Result<RelaySummary> {
        let target = parse_connect_target(target)?;
        info.upstream = Some(target.clone());

        let started = Instant::now();
        let upstream = self.connector.connect(&target).await?;

        client
            .write_all(CONNECTION_ESTABLISHED)
            .await
            .map_err(|e| Error::ClientWrite(e.to_string()))?;
        log_tunnel_established(&upstream, elapsed_ms(started));

        Ok(self.relay.run(client, upstream.into_stream()).await)
    }

    async fn serve_forward(
        &self,
        client: &mut TcpStream,
        raw: &[u8],
        request: &str,
        target: &str,
        info: &mut ConnectionInfo,
    ) -> Result<RelaySummary> {
        let target = resolve_forward_target(target, request)?;
        info.upstream = Some(target.clone());

        let mut upstream = self.connector.connect(&target).await?;
        log_forwarding(&upstream, raw.len());
        upstream.send(raw).await?;

        Ok(self.relay.run(client, upstream.into_stream()).await)
    }
}

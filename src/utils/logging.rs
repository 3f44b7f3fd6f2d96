//! Logging utility functions for proxy operations

use crate::log_debug;
use crate::models::ConnectionInfo;
use crate::proxy::relay::{RelayEnd, RelaySummary};
use crate::proxy::upstream::UpstreamLink;
use tracing::{debug, info};

/// Log a classified incoming request
pub fn log_incoming_request(info: &ConnectionInfo) {
    info!("📥 {}", info.describe());
    log_debug!(
        "🔍 REQUEST DETAILS:\n  Method: {}\n  Target: {}\n  Kind: {}\n  Remote: {}\n  Accepted: {}",
        info.method.as_deref().unwrap_or("-"),
        info.target.as_deref().unwrap_or("-"),
        info.kind.map(|kind| kind.to_string()).unwrap_or_else(|| "-".to_string()),
        info.peer,
        info.accepted_at.to_rfc3339()
    );
}

/// Log successful CONNECT tunnel establishment
pub fn log_tunnel_established(upstream: &UpstreamLink, connect_time: u64) {
    debug!(
        "✅ Tunnel established to {} via {} ({}ms)",
        upstream.target(),
        upstream.peer_addr(),
        connect_time
    );
}

/// Log a plain HTTP request being handed to its origin
pub fn log_forwarding(upstream: &UpstreamLink, bytes: usize) {
    debug!(
        "➡️ Forwarding {} bytes to {} via {}",
        bytes,
        upstream.target(),
        upstream.peer_addr()
    );
}

/// Log the end of a relay
pub fn log_relay_finished(info: &ConnectionInfo, summary: &RelaySummary, total_time: u64) {
    let ended = match summary.ended_by {
        RelayEnd::Closed(side) => format!("{} closed", side),
        RelayEnd::Failed(side) => format!("{} failed", side),
    };
    let upstream = info
        .upstream
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "-".to_string());

    debug!(
        "🔌 {} → {} finished ({}): {} bytes up, {} bytes down in {}ms",
        info.peer, upstream, ended, summary.client_to_upstream, summary.upstream_to_client, total_time
    );
}

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;

/// How a request is served once classified from its first line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// `CONNECT host:port`, served as an opaque tunnel
    Tunnel,
    /// Any other method, forwarded verbatim to the origin
    Forward,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Tunnel => f.write_str("tunnel"),
            RequestKind::Forward => f.write_str("forward"),
        }
    }
}

/// Host and port of the destination server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget {
    pub host: String,
    pub port: u16,
}

impl UpstreamTarget {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Metadata for one accepted client connection, derived from its first read
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
    pub accepted_at: DateTime<Utc>,
    pub method: Option<String>,
    pub target: Option<String>,
    pub kind: Option<RequestKind>,
    pub upstream: Option<UpstreamTarget>,
}

impl ConnectionInfo {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            accepted_at: Utc::now(),
            method: None,
            target: None,
            kind: None,
            upstream: None,
        }
    }

    /// Short label used in log lines
    pub fn describe(&self) -> String {
        match (&self.method, &self.target) {
            (Some(method), Some(target)) => format!("{} {} from {}", method, target, self.peer),
            _ => format!("connection from {}", self.peer),
        }
    }
}

/// Point-in-time copy of the process-wide counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub taken_at: DateTime<Utc>,
    pub total_requests: u64,
    pub active_connections: u64,
    pub errors: u64,
    pub rejected: u64,
}

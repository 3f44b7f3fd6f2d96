//! HTTP utility functions
//!
//! Only the request line and the `Host` header are ever interpreted; the
//! request bytes themselves are forwarded untouched.

use crate::error::{Error, Result};
use crate::models::UpstreamTarget;
use crate::utils::url::{is_absolute_http, parse_absolute_http_target};

/// Sent to the client once a CONNECT tunnel is open
pub const CONNECTION_ESTABLISHED: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";

/// Sent to the client when the proxy cannot serve the request
pub const INTERNAL_SERVER_ERROR: &[u8] = b"HTTP/1.1 500 Internal Server Error\r\n\r\n";

/// Port used when neither the URI nor the Host lookup supplies one
pub const DEFAULT_HTTP_PORT: u16 = 80;

/// Method and target token of the first request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLine {
    pub method: String,
    pub target: String,
}

impl RequestLine {
    pub fn is_connect(&self) -> bool {
        self.method == "CONNECT"
    }
}

/// Split the first line of `request` into method and target.
///
/// Fails when the line has no space-delimited target token.
pub fn parse_request_line(request: &str) -> Result<RequestLine> {
    let first_line = request.split("\r\n").next().unwrap_or_default();
    let mut tokens = first_line.split(' ');

    let method = tokens.next().unwrap_or_default();
    let target = match tokens.next() {
        Some(target) if !method.is_empty() && !target.is_empty() => target,
        _ => {
            return Err(Error::MalformedRequest(format!(
                "no target in request line {:?}",
                first_line
            )))
        }
    };

    Ok(RequestLine {
        method: method.to_string(),
        target: target.to_string(),
    })
}

/// Value of the first `Host:` header (case-insensitive), if any
pub fn find_host_header(request: &str) -> Option<String> {
    request
        .split("\r\n")
        .skip(1)
        .take_while(|line| !line.is_empty())
        .find(|line| {
            line.get(..5)
                .map_or(false, |name| name.eq_ignore_ascii_case("host:"))
        })
        .map(|line| line[5..].trim().to_string())
        .filter(|host| !host.is_empty())
}

/// Parse host and port from CONNECT target (`host:port` or `[v6]:port`)
pub fn parse_connect_target(target: &str) -> Result<UpstreamTarget> {
    let invalid = || Error::InvalidConnectTarget(target.to_string());

    let (host, port) = if let Some(rest) = target.strip_prefix('[') {
        let (host, port) = rest.split_once("]:").ok_or_else(invalid)?;
        (host, port)
    } else {
        let parts: Vec<&str> = target.split(':').collect();
        if parts.len() != 2 {
            return Err(invalid());
        }
        (parts[0], parts[1])
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;

    Ok(UpstreamTarget::new(host, port))
}

/// Resolve the origin for a non-CONNECT request.
///
/// Absolute `http://` targets carry their own host and port (default 80);
/// otherwise the Host header is used verbatim with port 80.
pub fn resolve_forward_target(target: &str, request: &str) -> Result<UpstreamTarget> {
    if is_absolute_http(target) {
        return parse_absolute_http_target(target);
    }

    find_host_header(request)
        .map(|host| UpstreamTarget::new(host, DEFAULT_HTTP_PORT))
        .ok_or(Error::MissingHost)
}

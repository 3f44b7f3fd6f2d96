//! URL utility functions

use crate::error::{Error, Result};
use crate::models::UpstreamTarget;
use crate::utils::http::DEFAULT_HTTP_PORT;
use url::{Host, Url};

/// Check if a request target is an absolute `http://` URI
pub fn is_absolute_http(target: &str) -> bool {
    target.starts_with("http://")
}

/// Extract the origin host and port from an absolute `http://` URI
pub fn parse_absolute_http_target(target: &str) -> Result<UpstreamTarget> {
    let url = Url::parse(target)?;

    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(Error::MissingHost),
    };

    Ok(UpstreamTarget::new(host, url.port().unwrap_or(DEFAULT_HTTP_PORT)))
}

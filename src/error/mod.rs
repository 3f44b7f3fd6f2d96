//! Error handling module for the proxy server

use thiserror::Error;
use tokio::time::error::Elapsed;

/// Custom error type for the proxy server
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Timeout error: {0}")]
    Timeout(#[from] Elapsed),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("No host found in request")]
    MissingHost,

    #[error("Invalid CONNECT target: {0}")]
    InvalidConnectTarget(String),

    #[error("Upstream connection error: {0}")]
    UpstreamConnection(String),

    #[error("Client write error: {0}")]
    ClientWrite(String),
}

impl Error {
    /// Parse failures close the connection without a response.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            Error::MalformedRequest(_) | Error::MissingHost | Error::UrlParse(_)
        )
    }
}

/// Result type for the proxy server
pub type Result<T> = std::result::Result<T, Error>;

//! Outbound connections to destination servers

pub mod client;

pub use client::{UpstreamConnector, UpstreamLink};

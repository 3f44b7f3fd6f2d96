//! Command-line interface for the proxy server

pub mod server;

pub use server::*;

//! Utility functions for the proxy server

pub mod http;
pub mod url;
pub mod time;
pub mod logging;

pub use self::http::*;
pub use self::url::*;
pub use self::time::*;
pub use self::logging::*;

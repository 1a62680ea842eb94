//! HTTP CONNECT proxy with a live-reloaded domain blacklist

pub mod access_log;
pub mod config;
pub mod error;
pub mod proxy;

// Re-export commonly used types
pub use access_log::AccessLog;
pub use config::{Config, ConfigLoader};
pub use error::{ProxyError, Result};
pub use proxy::{ProxyServer, ProxyServerConfig, Tunnel, TunnelHandler, TunnelState};

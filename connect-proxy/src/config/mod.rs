//! Configuration management for the proxy

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::{AccessLogConfig, BlacklistConfig, Config, ProxyConfig};

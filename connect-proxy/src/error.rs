//! Error types for proxy operations

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProxyError>;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("dial tcp {addr}: {source}")]
    DialFailed {
        addr: String,
        source: std::io::Error,
    },

    #[error("dial tcp {addr}: i/o timeout after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    #[error("Hijacking Interface not supported")]
    HijackUnsupported,

    #[error("Connection upgrade failed: {0}")]
    Upgrade(#[source] hyper::Error),

    #[error("Invalid CONNECT target: {0}")]
    InvalidTarget(String),

    #[error(transparent)]
    Blacklist(#[from] connect_filter::FilterError),

    #[error("Failed to load config from {path}: {source}")]
    ConfigLoad {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to write access log {path}: {source}")]
    AccessLog {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("HTTP error: {0}")]
    Http(#[from] hyper::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

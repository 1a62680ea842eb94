//! Configuration schema types

use connect_filter::ReloadPolicy;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_CYCLE_TIME_SECS: u64 = 2;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Complete proxy configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub blacklist: BlacklistConfig,
    #[serde(default)]
    pub access_log: AccessLogConfig,
}

impl Config {
    /// Resolve relative file locations against `dir`
    pub fn rooted_at(mut self, dir: &Path) -> Self {
        if self.blacklist.path.is_relative() {
            self.blacklist.path = dir.join(&self.blacklist.path);
        }
        if self.access_log.dir.is_relative() {
            self.access_log.dir = dir.join(&self.access_log.dir);
        }
        self
    }
}

/// Listener and upstream dial settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port", deserialize_with = "lenient_port")]
    pub port: u16,
    #[serde(
        default = "default_connect_timeout",
        deserialize_with = "lenient_connect_timeout"
    )]
    pub connect_timeout_secs: u64,
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_SECS
}

impl ProxyConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Blacklist source and reload settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlacklistConfig {
    #[serde(default = "default_blacklist_path")]
    pub path: PathBuf,
    /// Reload period in seconds
    #[serde(default = "default_cycle_time", deserialize_with = "lenient_cycle_time")]
    pub cycle_time: u64,
    /// Stop the proxy when the blacklist file cannot be read
    #[serde(default)]
    pub exit_on_error: bool,
}

fn default_blacklist_path() -> PathBuf {
    PathBuf::from("blacklist.txt")
}

fn default_cycle_time() -> u64 {
    DEFAULT_CYCLE_TIME_SECS
}

impl BlacklistConfig {
    pub fn cycle_time(&self) -> Duration {
        Duration::from_secs(self.cycle_time)
    }

    pub fn reload_policy(&self) -> ReloadPolicy {
        if self.exit_on_error {
            ReloadPolicy::ExitOnError
        } else {
            ReloadPolicy::RetainOnError
        }
    }
}

impl Default for BlacklistConfig {
    fn default() -> Self {
        Self {
            path: default_blacklist_path(),
            cycle_time: default_cycle_time(),
            exit_on_error: false,
        }
    }
}

/// Per-request access log
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccessLogConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

fn default_true() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(".")
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            dir: default_log_dir(),
        }
    }
}

// Numeric settings accept an integer or a numeric string. Anything else falls
// back to the default with a warning instead of rejecting the whole file.

fn lenient_number<'de, D>(
    deserializer: D,
    field: &str,
    default: u64,
    valid: impl Fn(u64) -> bool,
) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = toml::Value::deserialize(deserializer)?;
    let parsed = match &value {
        toml::Value::Integer(n) => u64::try_from(*n).ok(),
        toml::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };

    match parsed.filter(|n| valid(*n)) {
        Some(n) => Ok(n),
        None => {
            warn!("Invalid {} {}, using default ({})", field, value, default);
            Ok(default)
        }
    }
}

fn lenient_port<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u16, D::Error> {
    let port = lenient_number(deserializer, "port", u64::from(DEFAULT_PORT), |n| {
        n <= u64::from(u16::MAX)
    })?;
    Ok(u16::try_from(port).unwrap_or(DEFAULT_PORT))
}

fn lenient_cycle_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<u64, D::Error> {
    lenient_number(deserializer, "cycle_time", DEFAULT_CYCLE_TIME_SECS, |n| n > 0)
}

fn lenient_connect_timeout<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<u64, D::Error> {
    lenient_number(
        deserializer,
        "connect_timeout_secs",
        DEFAULT_CONNECT_TIMEOUT_SECS,
        |n| n > 0,
    )
}

//! Configuration file loading

use super::schema::Config;
use crate::error::{ProxyError, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub struct ConfigLoader;

impl ConfigLoader {
    pub const FILE_NAME: &'static str = "config.toml";

    /// Config file path inside the proxy's working directory
    pub fn default_config_path(dir: &Path) -> PathBuf {
        dir.join(Self::FILE_NAME)
    }

    /// Load config from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ProxyError::ConfigLoad {
            path: path.to_path_buf(),
            source: e,
        })?;

        Self::load_from_str(&contents)
    }

    pub fn load_from_str(contents: &str) -> Result<Config> {
        let config: Config = toml::from_str(contents)?;
        Ok(config)
    }

    /// Load config with fallback to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Config> {
        let path = path.as_ref();

        if path.exists() {
            Self::load_from_file(path)
        } else {
            tracing::info!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }
}

//! Error types for blacklist operations

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FilterError>;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Failed to read blacklist from {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

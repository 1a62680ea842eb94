//! Per-request access log written to one file per local day

use crate::error::{ProxyError, Result};
use chrono::{Local, NaiveDate};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Appends one line per request to a file named after the current date
/// (`DD-MM-YYYY`) in the log directory
///
/// The file is opened in append mode for every line, so a new day's file is
/// started without any rotation step.
#[derive(Debug)]
pub struct AccessLog {
    dir: PathBuf,
    // Serializes writers so concurrent lines never interleave
    write_lock: Mutex<()>,
}

impl AccessLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Log file for the given day
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(date.format("%d-%m-%Y").to_string())
    }

    /// Append a line for a request from `peer` to `host`
    pub async fn record(&self, peer: SocketAddr, host: &str) -> Result<()> {
        let now = Local::now();
        let path = self.file_for(now.date_naive());
        let line = format!("{} {} {}\n", now.format("%Y/%m/%d %H:%M:%S"), peer, host);

        let to_error = |source| ProxyError::AccessLog {
            path: path.clone(),
            source,
        };

        let _guard = self.write_lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(to_error)?;
        file.write_all(line.as_bytes()).await.map_err(to_error)?;
        file.flush().await.map_err(to_error)?;
        Ok(())
    }
}

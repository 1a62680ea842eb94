//! Periodic blacklist reload from a line-oriented file

use crate::blacklist::Blacklist;
use crate::error::{FilterError, Result};
use crate::store::BlacklistStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Shortest accepted reload period; `tokio::time::interval` rejects zero
const MIN_PERIOD: Duration = Duration::from_millis(10);

/// What the reload loop does when the source cannot be read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReloadPolicy {
    /// Keep the last published snapshot and try again next cycle
    #[default]
    RetainOnError,
    /// Stop the loop and return the error
    ExitOnError,
}

/// Re-reads the blacklist file on a fixed period and publishes it
pub struct BlacklistReloader {
    path: PathBuf,
    period: Duration,
    policy: ReloadPolicy,
    store: Arc<BlacklistStore>,
}

impl BlacklistReloader {
    pub fn new(path: impl Into<PathBuf>, period: Duration, store: Arc<BlacklistStore>) -> Self {
        Self {
            path: path.into(),
            period: period.max(MIN_PERIOD),
            policy: ReloadPolicy::default(),
            store,
        }
    }

    pub fn with_policy(mut self, policy: ReloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Read the source once and publish it, returning the pattern count
    ///
    /// On error nothing is published.
    pub async fn reload(&self) -> Result<usize> {
        let blacklist = load_blacklist(&self.path).await?;
        let count = blacklist.len();
        self.store.publish(blacklist);
        Ok(count)
    }

    /// Reload forever, starting immediately
    ///
    /// Each cycle finishes reading and publishing before the next tick is
    /// awaited, so reloads never overlap. Only returns under
    /// [`ReloadPolicy::ExitOnError`].
    pub async fn run(self) -> Result<()> {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            match self.reload().await {
                Ok(count) => debug!("Reloaded {} blacklist patterns from {:?}", count, self.path),
                Err(e) => match self.policy {
                    ReloadPolicy::RetainOnError => {
                        warn!("{}; keeping previous blacklist", e);
                    }
                    ReloadPolicy::ExitOnError => {
                        error!("{}", e);
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Run the reload loop on its own task
    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }
}

/// Read a blacklist file in full
pub async fn load_blacklist(path: &Path) -> Result<Blacklist> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| FilterError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(Blacklist::parse_bytes(&bytes))
}

//! Shared, atomically replaceable blacklist snapshot

use crate::blacklist::Blacklist;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Holds the currently published [`Blacklist`]
///
/// Readers get an `Arc` to a complete snapshot and keep using it for as long as
/// they hold it, even if a newer one is published in the meantime. Publishing
/// is a single pointer swap and never blocks readers.
#[derive(Debug)]
pub struct BlacklistStore {
    current: ArcSwap<Blacklist>,
}

impl BlacklistStore {
    pub fn new(initial: Blacklist) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
        }
    }

    /// Currently published snapshot
    pub fn get(&self) -> Arc<Blacklist> {
        self.current.load_full()
    }

    /// Replace the published snapshot, returning the previous one
    pub fn publish(&self, blacklist: Blacklist) -> Arc<Blacklist> {
        self.current.swap(Arc::new(blacklist))
    }

    /// Match `host` against the current snapshot
    pub fn is_blocked(&self, host: &str) -> bool {
        self.current.load().is_blocked(host)
    }
}

impl Default for BlacklistStore {
    fn default() -> Self {
        Self::new(Blacklist::default())
    }
}

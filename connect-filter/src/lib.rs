//! Domain blacklist for the CONNECT proxy
//!
//! Holds the published blacklist snapshot, decides whether a destination host
//! is blocked, and keeps the snapshot in sync with its backing file.

pub mod blacklist;
pub mod error;
pub mod matcher;
pub mod reloader;
pub mod store;

pub use blacklist::Blacklist;
pub use error::{FilterError, Result};
pub use matcher::{matches, Rule};
pub use reloader::{BlacklistReloader, ReloadPolicy};
pub use store::BlacklistStore;

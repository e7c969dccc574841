//! Local quote cache.
//!
//! A single key-value object store: each key (usually a user id) maps to an
//! ordered list of quotes. Writes are read-modify-write appends; there is no
//! deduplication and no reconciliation with backend ids.

mod document;
mod file;
mod memory;

use async_trait::async_trait;
use mitsumori_core::Quote;
use std::io;
use thiserror::Error;

pub use document::{default_upgrade, CacheDocument, QuoteStore, UpgradeFn};
pub use file::FileQuoteCache;
pub use memory::InMemoryQuoteCache;

pub const DATABASE_NAME: &str = "Mitsumori";
pub const STORE_NAME: &str = "MitsumoriStore";
/// Bump whenever the key or value shape changes; never reshape in place.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] io::Error),
    #[error("cache document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("cache schema version {found} is newer than supported version {supported}")]
    Downgrade { found: u32, supported: u32 },
    #[error("object store '{0}' does not exist")]
    MissingStore(String),
    #[error("config error: {0}")]
    Config(String),
}

#[async_trait]
pub trait QuoteCache: Send + Sync {
    /// `None` when nothing was ever written under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<Quote>>, CacheError>;

    /// Appends `quote` to the sequence under `key` and returns the sequence as
    /// written.
    async fn put(&self, key: &str, quote: Quote) -> Result<Vec<Quote>, CacheError>;
}

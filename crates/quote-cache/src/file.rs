use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use directories::BaseDirs;
use mitsumori_core::Quote;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::document::{append, default_upgrade, CacheDocument, UpgradeFn};
use crate::{CacheError, QuoteCache, DATABASE_NAME, SCHEMA_VERSION, STORE_NAME};

/// Durable cache backed by a single JSON document.
///
/// The document is opened lazily on first use and every access goes through
/// one async mutex, so puts from this process apply in call order. Writers in
/// other processes are not coordinated; the last rename wins.
pub struct FileQuoteCache {
    path: PathBuf,
    version: u32,
    upgrade: UpgradeFn,
    connection: Mutex<Option<CacheDocument>>,
}

impl FileQuoteCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_schema(path, SCHEMA_VERSION, default_upgrade())
    }

    pub fn with_schema(path: impl Into<PathBuf>, version: u32, upgrade: UpgradeFn) -> Self {
        Self {
            path: path.into(),
            version,
            upgrade,
            connection: Mutex::new(None),
        }
    }

    pub fn at_default_location() -> Result<Self, CacheError> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn default_path() -> Result<PathBuf, CacheError> {
        let base = BaseDirs::new()
            .ok_or_else(|| CacheError::Config("unable to determine data directory".into()))?;
        Ok(base.data_dir().join(DATABASE_NAME).join("cache.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drops the open document; the next call reads it back from disk.
    pub async fn close(&self) {
        self.connection.lock().await.take();
    }

    async fn connection(&self) -> Result<MutexGuard<'_, Option<CacheDocument>>, CacheError> {
        let mut guard = self.connection.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(guard)
    }

    async fn open(&self) -> Result<CacheDocument, CacheError> {
        let mut document = match fs::read(&self.path).await {
            Ok(raw) => serde_json::from_slice::<CacheDocument>(&raw)?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => CacheDocument::default(),
            Err(err) => return Err(err.into()),
        };

        if document.version > self.version {
            return Err(CacheError::Downgrade {
                found: document.version,
                supported: self.version,
            });
        }

        if document.version < self.version {
            let from = document.version;
            (self.upgrade)(&mut document, from, self.version);
            document.version = self.version;
            self.persist(&document).await?;
            info!(
                target: "mitsumori::cache",
                path = %self.path.display(),
                from,
                to = self.version,
                "upgraded quote cache schema"
            );
        }

        debug!(
            target: "mitsumori::cache",
            path = %self.path.display(),
            version = document.version,
            "opened quote cache"
        );
        Ok(document)
    }

    async fn persist(&self, document: &CacheDocument) -> Result<(), CacheError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let serialized = serde_json::to_vec_pretty(document)?;
        let staging = self.path.with_extension("json.tmp");
        let mut options = fs::OpenOptions::new();
        options.create(true).write(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);
        let mut file = options.open(&staging).await?;
        file.write_all(&serialized).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl QuoteCache for FileQuoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<Quote>>, CacheError> {
        let guard = self.connection().await?;
        let store = guard
            .as_ref()
            .and_then(|document| document.store(STORE_NAME))
            .ok_or_else(|| CacheError::MissingStore(STORE_NAME.to_string()))?;
        Ok(store.get(key).cloned())
    }

    async fn put(&self, key: &str, quote: Quote) -> Result<Vec<Quote>, CacheError> {
        let mut guard = self.connection().await?;
        let document = guard
            .as_mut()
            .ok_or_else(|| CacheError::Config("cache connection unavailable".into()))?;
        let store = document
            .store_mut(STORE_NAME)
            .ok_or_else(|| CacheError::MissingStore(STORE_NAME.to_string()))?;
        let written = append(store, key, quote);

        if let Err(err) = self.persist(document).await {
            // Memory is ahead of disk now; reread on the next call.
            *guard = None;
            return Err(err);
        }
        Ok(written)
    }
}

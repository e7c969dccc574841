use crate::STORE_NAME;
use mitsumori_core::Quote;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type QuoteStore = BTreeMap<String, Vec<Quote>>;

/// Runs once when an older document is opened at a newer schema version.
/// Arguments are the document, the stored version and the target version.
pub type UpgradeFn = Arc<dyn Fn(&mut CacheDocument, u32, u32) + Send + Sync>;

/// On-disk shape of the cache database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    /// Zero means the database has never been created.
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub stores: BTreeMap<String, QuoteStore>,
}

impl CacheDocument {
    pub fn create_store(&mut self, name: &str) {
        self.stores.entry(name.to_string()).or_default();
    }

    pub fn store(&self, name: &str) -> Option<&QuoteStore> {
        self.stores.get(name)
    }

    pub fn store_mut(&mut self, name: &str) -> Option<&mut QuoteStore> {
        self.stores.get_mut(name)
    }
}

/// Upgrade hook for schema version 1: creates the quote store.
pub fn default_upgrade() -> UpgradeFn {
    Arc::new(|document: &mut CacheDocument, _from: u32, _to: u32| {
        document.create_store(STORE_NAME);
    })
}

pub(crate) fn append(store: &mut QuoteStore, key: &str, quote: Quote) -> Vec<Quote> {
    let entry = store.entry(key.to_string()).or_default();
    entry.push(quote);
    entry.clone()
}

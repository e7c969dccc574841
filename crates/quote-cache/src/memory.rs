use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use mitsumori_core::Quote;
use tokio::sync::Mutex;

use crate::{CacheError, QuoteCache};

/// In-memory adapter for tests and ephemeral embeddings.
#[derive(Default)]
pub struct InMemoryQuoteCache {
    entries: Mutex<HashMap<String, Vec<Quote>>>,
}

impl InMemoryQuoteCache {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl QuoteCache for InMemoryQuoteCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<Quote>>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn put(&self, key: &str, quote: Quote) -> Result<Vec<Quote>, CacheError> {
        let mut guard = self.entries.lock().await;
        let entry = guard.entry(key.to_string()).or_default();
        entry.push(quote);
        Ok(entry.clone())
    }
}

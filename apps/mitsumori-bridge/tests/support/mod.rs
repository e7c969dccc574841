#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use mitsumori_bridge::bridge::Envelope;
use mitsumori_bridge::ui::{ResponseStream, UiPorts};
use mitsumori_bridge::{Bridge, BridgeHandle};
use port_bus::{Bus, LocalBus};
use quote_cache::InMemoryQuoteCache;
use serde::de::DeserializeOwned;
use supabase_sdk::{Backend, InMemoryBackend};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::SubscriberBuilder;

pub const WAIT: Duration = Duration::from_secs(2);

pub struct Harness {
    pub bus: Arc<dyn Bus>,
    pub cache: Arc<InMemoryQuoteCache>,
    pub ui: UiPorts,
    pub handle: BridgeHandle,
}

impl Harness {
    pub fn start(backend: Arc<dyn Backend>) -> Self {
        init_tracing();
        let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
        let cache = InMemoryQuoteCache::new();
        let handle = Bridge::new(backend, cache.clone(), bus.clone())
            .start()
            .expect("bridge starts");
        Self {
            ui: UiPorts::new(bus.clone()),
            bus,
            cache,
            handle,
        }
    }

    pub fn in_memory() -> (Self, Arc<InMemoryBackend>) {
        let backend = InMemoryBackend::new();
        (Self::start(backend.clone()), backend)
    }
}

pub fn init_tracing() {
    let _ = SubscriberBuilder::default()
        .with_test_writer()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

pub async fn next<T: DeserializeOwned>(stream: &mut ResponseStream) -> Envelope<T> {
    tokio::time::timeout(WAIT, stream.next())
        .await
        .expect("response within timeout")
        .expect("decodable response")
}

/// Lets spawned workers run long enough to publish anything they were going to.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

//! Channel bridge: one worker per inbound port, each answering on the paired
//! response port.
//!
//! Messages on one port are handled strictly one at a time in arrival order;
//! different ports run concurrently. Every request yields exactly one response
//! envelope, including when its handler panics. Backend session notifications
//! reach the bridge as messages on the internal `authStateChange` port, so
//! they go through the same dispatch path as ordinary requests.

mod envelope;
mod handlers;
mod ports;
mod requests;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use port_bus::{Bus, BusError, BusMessage};
use quote_cache::{CacheError, FileQuoteCache, QuoteCache};
use supabase_sdk::{Backend, BackendError, SupabaseClient};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{AuthError, SessionTracker};
use crate::config::BridgeConfig;
use crate::logging::{self, InitError};
use handlers::{Reply, Services};

pub use envelope::{ChannelError, Envelope, ErrorKind};
pub use ports::{InboundPort, OutboundPort};

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Logging(#[from] InitError),
}

pub struct Bridge {
    services: Services,
    bus: Arc<dyn Bus>,
}

impl Bridge {
    pub fn new(backend: Arc<dyn Backend>, cache: Arc<dyn QuoteCache>, bus: Arc<dyn Bus>) -> Self {
        Self {
            services: Services {
                backend,
                cache,
                tracker: SessionTracker::new(),
            },
            bus,
        }
    }

    /// Builds the HTTPS backend client and the file cache described by `config`.
    pub fn from_config(config: &BridgeConfig, bus: Arc<dyn Bus>) -> Result<Self, BridgeError> {
        let backend = SupabaseClient::new(config.supabase.clone())?;
        let cache = match &config.cache_path {
            Some(path) => FileQuoteCache::new(path),
            None => FileQuoteCache::at_default_location()?,
        };
        Ok(Self::new(Arc::new(backend), Arc::new(cache), bus))
    }

    /// Standalone startup: installs the global log subscriber from
    /// `config.log`, builds the configured backend and cache, and starts
    /// serving `bus`.
    pub fn launch(config: &BridgeConfig, bus: Arc<dyn Bus>) -> Result<BridgeHandle, BridgeError> {
        logging::init(&config.log)?;
        Self::from_config(config, bus)?.start()
    }

    pub fn with_tracker(mut self, tracker: Arc<SessionTracker>) -> Self {
        self.services.tracker = tracker;
        self
    }

    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.services.tracker
    }

    /// Claims every inbound port, subscribes the tracker to backend
    /// notifications and spawns the channel workers.
    ///
    /// Fails with [`BusError::AlreadyClaimed`] when another bridge is already
    /// serving the bus.
    pub fn start(self) -> Result<BridgeHandle, BridgeError> {
        let mut queues = Vec::with_capacity(InboundPort::ALL.len());
        for port in InboundPort::ALL {
            queues.push((port, self.bus.claim(port.topic())?));
        }

        let tracker = self.services.tracker.clone();
        if !tracker.state().is_authenticated() {
            if let Some(session) = self.services.backend.current_session() {
                tracker.authenticate(session);
            }
        }
        tracker.attach(self.services.backend.auth_events(), self.bus.clone())?;

        let workers = queues
            .into_iter()
            .map(|(port, inbound)| {
                spawn_worker(port, inbound, self.services.clone(), self.bus.clone())
            })
            .collect();

        info!(
            target: "mitsumori::bridge",
            ports = InboundPort::ALL.len(),
            authenticated = tracker.state().is_authenticated(),
            "bridge started"
        );
        Ok(BridgeHandle { workers, tracker })
    }
}

/// Running bridge. Dropping the handle leaves the workers running; call
/// [`BridgeHandle::shutdown`] to stop them.
pub struct BridgeHandle {
    workers: Vec<JoinHandle<()>>,
    tracker: Arc<SessionTracker>,
}

impl BridgeHandle {
    pub fn tracker(&self) -> &Arc<SessionTracker> {
        &self.tracker
    }

    /// Stops the workers and the tracker's subscription. Requests still in
    /// flight are dropped without a response. The inbound ports can be
    /// claimed again afterwards.
    pub async fn shutdown(self) {
        self.tracker.detach();
        for worker in &self.workers {
            worker.abort();
        }
        for worker in self.workers {
            let _ = worker.await;
        }
        info!(target: "mitsumori::bridge", "bridge stopped");
    }
}

fn spawn_worker(
    port: InboundPort,
    mut inbound: mpsc::UnboundedReceiver<BusMessage>,
    services: Services,
    bus: Arc<dyn Bus>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let channel = port.topic();
        let response = port.response().topic();

        while let Some(message) = inbound.recv().await {
            let outcome = AssertUnwindSafe(services.dispatch(port, &message.payload))
                .catch_unwind()
                .await;
            let reply = match outcome {
                Ok(Some(reply)) => reply,
                Ok(None) => {
                    debug!(
                        target: "mitsumori::bridge",
                        channel,
                        "notification left session unchanged"
                    );
                    continue;
                }
                Err(panic) => {
                    let reason = panic_reason(panic.as_ref());
                    warn!(target: "mitsumori::bridge", channel, reason, "handler panicked");
                    Reply::failure(ChannelError::internal(format!("handler panicked: {reason}")))
                }
            };

            if reply.ok {
                debug!(target: "mitsumori::bridge", channel, response, "request handled");
            } else {
                warn!(
                    target: "mitsumori::bridge",
                    channel,
                    response,
                    error = %String::from_utf8_lossy(&reply.payload),
                    "request failed"
                );
            }

            if let Err(err) = bus.publish(response, reply.payload) {
                warn!(
                    target: "mitsumori::bridge",
                    channel,
                    error = %err,
                    "failed to publish response"
                );
                break;
            }
        }
        debug!(target: "mitsumori::bridge", channel, "channel worker exiting");
    })
}

fn panic_reason(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

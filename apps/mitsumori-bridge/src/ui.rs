//! The UI core's side of the port bus: typed send on inbound ports and
//! envelope decoding on response ports.

use std::sync::Arc;

use bytes::Bytes;
use port_bus::{Bus, BusError, BusMessage};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::bridge::{Envelope, InboundPort, OutboundPort};

#[derive(Debug, Error)]
pub enum UiError {
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error("payload encoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("port '{0}' is internal to the bridge")]
    InternalPort(&'static str),
    #[error("response port closed")]
    Closed,
    #[error("missed {0} responses")]
    Lagged(u64),
}

#[derive(Clone)]
pub struct UiPorts {
    bus: Arc<dyn Bus>,
}

impl UiPorts {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    pub fn send<T: Serialize>(&self, port: InboundPort, payload: &T) -> Result<(), UiError> {
        self.send_raw(port, Bytes::from(serde_json::to_vec(payload)?))
    }

    /// For `signOut` and `getSession`.
    pub fn send_empty(&self, port: InboundPort) -> Result<(), UiError> {
        self.send_raw(port, Bytes::new())
    }

    pub fn send_raw(&self, port: InboundPort, payload: Bytes) -> Result<(), UiError> {
        if !port.is_public() {
            return Err(UiError::InternalPort(port.topic()));
        }
        Ok(self.bus.send(port.topic(), payload)?)
    }

    pub fn subscribe(&self, port: OutboundPort) -> ResponseStream {
        ResponseStream {
            inner: self.bus.subscribe(port.topic()),
        }
    }
}

/// Responses published on one outbound port after the subscription was made.
pub struct ResponseStream {
    inner: broadcast::Receiver<BusMessage>,
}

impl ResponseStream {
    pub async fn next<T: DeserializeOwned>(&mut self) -> Result<Envelope<T>, UiError> {
        match self.inner.recv().await {
            Ok(message) => decode(&message),
            Err(RecvError::Closed) => Err(UiError::Closed),
            Err(RecvError::Lagged(skipped)) => Err(UiError::Lagged(skipped)),
        }
    }

    /// A response that is already waiting, if any.
    pub fn try_next<T: DeserializeOwned>(&mut self) -> Option<Result<Envelope<T>, UiError>> {
        match self.inner.try_recv() {
            Ok(message) => Some(decode(&message)),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(UiError::Closed)),
            Err(TryRecvError::Lagged(skipped)) => Some(Err(UiError::Lagged(skipped))),
        }
    }
}

fn decode<T: DeserializeOwned>(message: &BusMessage) -> Result<Envelope<T>, UiError> {
    Ok(serde_json::from_slice(&message.payload)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use port_bus::LocalBus;

    #[test]
    fn internal_ports_are_not_writable() {
        let ui = UiPorts::new(Arc::new(LocalBus::new()));
        assert!(matches!(
            ui.send_empty(InboundPort::AuthStateChange),
            Err(UiError::InternalPort("authStateChange"))
        ));
    }

    #[tokio::test]
    async fn decodes_envelopes_from_response_ports() {
        let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
        let ui = UiPorts::new(bus.clone());
        let mut responses = ui.subscribe(OutboundPort::SessionResponse);
        assert!(responses.try_next::<()>().is_none());

        bus.publish("sessionResponse", Bytes::from_static(br#"{"ok":true,"value":null}"#))
            .unwrap();
        let envelope: Envelope<Option<String>> = responses.next().await.unwrap();
        assert_eq!(envelope, Envelope::Ok(None));
    }
}

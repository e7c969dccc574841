//! Port bus: the message substrate between a UI core and the bridge.
//!
//! Inbound ports are queues with exactly one consumer, delivered in send
//! order. Outbound ports are broadcast topics any number of UI listeners can
//! subscribe to.

use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

const DEFAULT_TOPIC_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus channel closed")]
    Closed,
    #[error("port '{0}' already has a consumer")]
    AlreadyClaimed(String),
}

pub type BusResult<T> = Result<T, BusError>;

pub trait Bus: Send + Sync {
    /// Takes the single consumer end of an inbound port. Messages sent before
    /// the claim are buffered and delivered first.
    fn claim(&self, topic: &str) -> BusResult<mpsc::UnboundedReceiver<BusMessage>>;
    fn send(&self, topic: &str, payload: Bytes) -> BusResult<()>;
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;
    /// Publishing to a topic nobody listens to drops the message.
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;
}

#[derive(Debug)]
struct InboundQueue {
    tx: mpsc::UnboundedSender<BusMessage>,
    rx: Option<mpsc::UnboundedReceiver<BusMessage>>,
}

impl InboundQueue {
    fn open() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }

    fn consumer_gone(&self) -> bool {
        self.rx.is_none() && self.tx.is_closed()
    }
}

/// In-process bus used by embedders and tests.
#[derive(Debug)]
pub struct LocalBus {
    queues: RwLock<HashMap<String, InboundQueue>>,
    topics: RwLock<HashMap<String, broadcast::Sender<BusMessage>>>,
    capacity: usize,
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_TOPIC_CAPACITY)
    }
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// `capacity` bounds how far a slow outbound subscriber may fall behind.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            topics: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Bus for LocalBus {
    fn claim(&self, topic: &str) -> BusResult<mpsc::UnboundedReceiver<BusMessage>> {
        let mut guard = self.queues.write();
        let queue = guard
            .entry(topic.to_string())
            .or_insert_with(InboundQueue::open);
        if queue.consumer_gone() {
            *queue = InboundQueue::open();
        }
        queue
            .rx
            .take()
            .ok_or_else(|| BusError::AlreadyClaimed(topic.to_string()))
    }

    fn send(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let message = BusMessage {
            topic: topic.to_string(),
            payload,
        };
        if let Some(queue) = self.queues.read().get(topic) {
            return queue.tx.send(message).map_err(|_| BusError::Closed);
        }
        let mut guard = self.queues.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(InboundQueue::open)
            .tx
            .send(message)
            .map_err(|_| BusError::Closed)
    }

    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        let sender = self.sender_for(topic);
        // A send error only means there are no live subscribers right now.
        let _ = sender.send(BusMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}

//! In-process pub/sub.
//!
//! A [`MemoryBroker`] fans every message out to all live subscribers, like a
//! Redis channel. Subscribers only see messages published after they
//! subscribed, and a subscriber that falls more than the broker capacity
//! behind loses the oldest messages.

use super::{EventPublisher, EventSubscriber, TransportError, decode_message, preview};
use crate::events::RawEvent;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, warn};

/// Default number of in-flight messages per subscriber.
pub const DEFAULT_BROKER_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct Envelope {
    channel: Arc<str>,
    payload: Arc<[u8]>,
}

/// Shared hub that hands out publishers and subscribers.
///
/// The stream seen by subscribers ends once the broker and every publisher
/// created from it have been dropped.
#[derive(Debug, Clone)]
pub struct MemoryBroker {
    tx: broadcast::Sender<Envelope>,
}

impl MemoryBroker {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            tx: Some(self.tx.clone()),
        }
    }

    pub fn subscriber(&self) -> MemorySubscriber {
        MemorySubscriber {
            broker: Some(self.tx.clone()),
            channel: None,
            rx: None,
            closed: false,
        }
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new(DEFAULT_BROKER_CAPACITY)
    }
}

#[derive(Debug)]
pub struct MemoryPublisher {
    tx: Option<broadcast::Sender<Envelope>>,
}

impl MemoryPublisher {
    /// Publish raw bytes without encoding them, e.g. a malformed body.
    ///
    /// Returns the number of live subscribers on the broker, `0` if the
    /// message was lost because nobody was listening.
    pub fn publish_raw(
        &self,
        channel: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<usize, TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::Closed)?;
        let envelope = Envelope {
            channel: Arc::from(channel),
            payload: Arc::from(payload.into()),
        };
        Ok(tx.send(envelope).unwrap_or(0))
    }
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    async fn publish(&self, channel: &str, message: &Value) -> Result<usize, TransportError> {
        let payload = serde_json::to_vec(message)?;
        self.publish_raw(channel, payload)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.tx = None;
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemorySubscriber {
    /// Held only until the first subscribe, so the stream can end.
    broker: Option<broadcast::Sender<Envelope>>,
    channel: Option<String>,
    rx: Option<broadcast::Receiver<Envelope>>,
    closed: bool,
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.channel.as_deref() {
            Some(current) if current == channel => return Ok(()),
            Some(current) => return Err(TransportError::AlreadySubscribed(current.to_string())),
            None => {}
        }

        let broker = self.broker.take().ok_or(TransportError::Closed)?;
        self.rx = Some(broker.subscribe());
        self.channel = Some(channel.to_string());
        debug!(channel = %channel, "Subscribed to in-memory channel");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RawEvent> {
        let rx = self.rx.as_mut()?;
        let channel = self.channel.as_deref()?;
        loop {
            match rx.recv().await {
                Ok(envelope) if *envelope.channel == *channel => {
                    match decode_message(&envelope.payload) {
                        Ok(event) => return Some(event),
                        Err(e) => {
                            error!(
                                channel = %channel,
                                error = %e,
                                payload = %preview(&envelope.payload),
                                "Skipping undecodable message"
                            );
                        }
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        self.broker = None;
        self.rx = None;
        Ok(())
    }
}

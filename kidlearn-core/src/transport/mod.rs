//! Message transports.
//!
//! The worker depends only on [`EventSubscriber`]; publishers only on
//! [`EventPublisher`]. Each backend provides one adapter per side:
//!
//! - [`redis`]: Redis pub/sub, used in production
//! - [`memory`]: an in-process broadcast hub with the same fan-out and
//!   at-most-once semantics, used in tests and local wiring
//!
//! Delivery is best effort. Nothing is acknowledged upstream, and a message
//! published while no subscriber is listening is lost.

pub mod memory;
pub mod redis;

use crate::events::RawEvent;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use self::memory::{MemoryBroker, MemoryPublisher, MemorySubscriber};
pub use self::redis::{RedisPublisher, RedisSubscriber};

/// Longest payload prefix written to the log for undecodable messages.
const PREVIEW_CHARS: usize = 100;

/// Errors raised by the transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("already subscribed to channel {0}")]
    AlreadySubscribed(String),

    #[error("transport is closed")]
    Closed,
}

/// Why a single message could not be turned into a [`RawEvent`].
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message is not a JSON object")]
    NotAnObject,
}

/// Receiving side of a channel.
///
/// Implementations decode messages themselves and skip the ones that fail,
/// so callers only ever see well-formed objects.
#[async_trait]
pub trait EventSubscriber: Send {
    /// Establish the subscription.
    ///
    /// Subscribing again to the same channel is a no-op. A subscriber that
    /// has been closed cannot be reused.
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError>;

    /// Wait for the next decodable event.
    ///
    /// Returns `None` when the stream has ended or nothing is subscribed.
    /// Cancel-safe: dropping the future loses no decoded event.
    async fn next_event(&mut self) -> Option<RawEvent>;

    /// Release the subscription and its connection. Safe to call repeatedly
    /// and without a prior `subscribe`.
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Sending side of a channel.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a JSON message. Returns how many subscribers received it.
    async fn publish(&self, channel: &str, message: &Value) -> Result<usize, TransportError>;

    /// Release the connection. Later publishes fail with [`TransportError::Closed`].
    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Decode one message body into an event object.
pub fn decode_message(payload: &[u8]) -> Result<RawEvent, DecodeError> {
    match serde_json::from_slice(payload)? {
        Value::Object(event) => Ok(event),
        _ => Err(DecodeError::NotAnObject),
    }
}

/// Lossy, truncated rendering of a message body for log lines.
pub fn preview(payload: &[u8]) -> String {
    String::from_utf8_lossy(payload)
        .chars()
        .take(PREVIEW_CHARS)
        .collect()
}

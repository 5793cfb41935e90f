//! Redis pub/sub adapters.

use super::{EventPublisher, EventSubscriber, TransportError, decode_message, preview};
use crate::events::RawEvent;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use serde_json::Value;
use tracing::{debug, error, info};

/// Subscribes to one Redis channel on a dedicated pub/sub connection.
///
/// The connection is opened by [`subscribe`](EventSubscriber::subscribe);
/// constructing the subscriber only validates the URL.
pub struct RedisSubscriber {
    client: Client,
    channel: Option<String>,
    messages: Option<BoxStream<'static, redis::Msg>>,
    closed: bool,
}

impl RedisSubscriber {
    pub fn new(redis_url: &str) -> Result<Self, TransportError> {
        Ok(Self {
            client: Client::open(redis_url)?,
            channel: None,
            messages: None,
            closed: false,
        })
    }
}

#[async_trait]
impl EventSubscriber for RedisSubscriber {
    async fn subscribe(&mut self, channel: &str) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        match self.channel.as_deref() {
            Some(current) if current == channel => return Ok(()),
            Some(current) => return Err(TransportError::AlreadySubscribed(current.to_string())),
            None => {}
        }

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel).await?;
        self.messages = Some(pubsub.into_on_message().boxed());
        self.channel = Some(channel.to_string());

        info!(channel = %channel, "Subscribed to Redis channel");
        Ok(())
    }

    async fn next_event(&mut self) -> Option<RawEvent> {
        let messages = self.messages.as_mut()?;
        loop {
            let msg = messages.next().await?;
            let payload = msg.get_payload_bytes();
            match decode_message(payload) {
                Ok(event) => return Some(event),
                Err(e) => {
                    error!(
                        channel = %msg.get_channel_name(),
                        error = %e,
                        payload = %preview(payload),
                        "Skipping undecodable message"
                    );
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // Dropping the stream drops the pub/sub connection, which ends the
        // subscription server-side.
        if self.messages.take().is_some() {
            info!(channel = ?self.channel, "Redis subscriber closed");
        }
        Ok(())
    }
}

/// Publishes JSON messages over a managed (auto-reconnecting) connection.
#[derive(Clone)]
pub struct RedisPublisher {
    connection: Option<ConnectionManager>,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str) -> Result<Self, TransportError> {
        let client = Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        Ok(Self {
            connection: Some(connection),
        })
    }
}

#[async_trait]
impl EventPublisher for RedisPublisher {
    async fn publish(&self, channel: &str, message: &Value) -> Result<usize, TransportError> {
        let mut conn = self.connection.clone().ok_or(TransportError::Closed)?;
        let payload = serde_json::to_string(message)?;

        let receivers: usize = conn.publish(channel, &payload).await?;
        debug!(
            channel = %channel,
            receivers,
            payload = %preview(payload.as_bytes()),
            "Published message"
        );
        Ok(receivers)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.connection.take().is_some() {
            info!("Redis publisher closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_rejects_invalid_url() {
        assert!(matches!(
            RedisSubscriber::new("not a url"),
            Err(TransportError::Redis(_))
        ));
    }

    #[tokio::test]
    async fn test_subscriber_close_without_subscribe() {
        let mut subscriber = RedisSubscriber::new("redis://localhost:6379").unwrap();
        assert!(subscriber.next_event().await.is_none());
        subscriber.close().await.unwrap();
        subscriber.close().await.unwrap();
        assert!(matches!(
            subscriber.subscribe("learning-events").await,
            Err(TransportError::Closed)
        ));
    }
}

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{BusError, BusMessage, BusSubscription, MessageBus};

/// Redis `PUBLISH` / `PSUBSCRIBE` bus.
pub struct RedisBus {
    client: redis::Client,
    publisher: Mutex<Option<MultiplexedConnection>>,
}

impl RedisBus {
    /// Validates the URL; the connection itself is opened lazily.
    pub fn new(url: &str) -> Result<Self, BusError> {
        let client = redis::Client::open(url).map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Self {
            client,
            publisher: Mutex::new(None),
        })
    }

    async fn publisher(&self) -> Result<MultiplexedConnection, BusError> {
        let mut slot = self.publisher.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }
}

#[async_trait]
impl MessageBus for RedisBus {
    fn name(&self) -> &str {
        "redis"
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        let mut conn = self.publisher().await?;
        match conn.publish::<_, _, i64>(channel, payload).await {
            Ok(receivers) => {
                debug!(channel, receivers, "published to redis");
                Ok(())
            }
            Err(e) => {
                // Force a fresh connection next time.
                self.publisher.lock().await.take();
                Err(BusError::Publish(e.to_string()))
            }
        }
    }

    async fn subscribe(&self, pattern: &str) -> Result<Box<dyn BusSubscription>, BusError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        pubsub
            .psubscribe(pattern)
            .await
            .map_err(|e| BusError::Connection(e.to_string()))?;
        Ok(Box::new(RedisSubscription {
            stream: Box::pin(pubsub.into_on_message()),
        }))
    }
}

struct RedisSubscription {
    stream: Pin<Box<dyn Stream<Item = redis::Msg> + Send>>,
}

#[async_trait]
impl BusSubscription for RedisSubscription {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        match tokio::time::timeout(timeout, self.stream.next()).await {
            Err(_) => Ok(None),
            Ok(None) => Err(BusError::Closed),
            Ok(Some(msg)) => {
                let channel = msg.get_channel_name().to_string();
                let payload = msg.get_payload::<String>().unwrap_or_else(|e| {
                    warn!(channel = %channel, error = %e, "non-text redis payload");
                    String::from_utf8_lossy(msg.get_payload_bytes()).into_owned()
                });
                Ok(Some(BusMessage { channel, payload }))
            }
        }
    }
}

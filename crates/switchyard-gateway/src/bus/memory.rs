use std::time::Duration;

use async_trait::async_trait;
use glob::Pattern;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::warn;

use super::{BusError, BusMessage, BusSubscription, MessageBus};

const CAPACITY: usize = 1024;

/// In-process bus. Clones share the same channel, so several gateways in one
/// process see each other's publishes.
#[derive(Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<BusMessage>,
}

impl MemoryBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CAPACITY);
        Self { tx }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    fn name(&self) -> &str {
        "memory"
    }

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError> {
        // No subscribers is not an error.
        let _ = self.tx.send(BusMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        });
        Ok(())
    }

    async fn subscribe(&self, pattern: &str) -> Result<Box<dyn BusSubscription>, BusError> {
        let compiled = Pattern::new(pattern).map_err(|e| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.msg.to_string(),
        })?;
        Ok(Box::new(MemorySubscription {
            rx: self.tx.subscribe(),
            pattern: compiled,
        }))
    }
}

struct MemorySubscription {
    rx: broadcast::Receiver<BusMessage>,
    pattern: Pattern,
}

#[async_trait]
impl BusSubscription for MemorySubscription {
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return Ok(None),
                Ok(Ok(msg)) if self.pattern.matches(&msg.channel) => return Ok(Some(msg)),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(n))) => {
                    warn!(skipped = n, "memory bus subscriber lagged");
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(BusError::Closed),
            }
        }
    }
}

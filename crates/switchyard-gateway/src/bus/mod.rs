//! Cross-process pub/sub backends.

mod memory;
mod redis;

use std::time::Duration;

use async_trait::async_trait;

pub use self::memory::MemoryBus;
pub use self::redis::RedisBus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub channel: String,
    pub payload: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus connection failed: {0}")]
    Connection(String),
    #[error("publish failed: {0}")]
    Publish(String),
    #[error("invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
    #[error("subscription closed")]
    Closed,
}

#[async_trait]
pub trait MessageBus: Send + Sync {
    fn name(&self) -> &str;

    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BusError>;

    /// Subscribe to every channel matching a glob `pattern` (`*`, `?`, `[..]`).
    async fn subscribe(&self, pattern: &str) -> Result<Box<dyn BusSubscription>, BusError>;
}

#[async_trait]
pub trait BusSubscription: Send {
    /// Wait up to `timeout` for the next message. `Ok(None)` on timeout.
    async fn next_message(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError>;
}

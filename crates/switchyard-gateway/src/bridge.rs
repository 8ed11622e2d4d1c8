//! Bridges topic publishes through the message bus and relays bus traffic to
//! local subscribers.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusError, BusMessage, MessageBus};
use crate::topics::{canonical_topic, TopicError, TopicRegistry, TOPIC_PREFIX};

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Bus(#[from] BusError),
}

/// Publish `message` on `topic`. Delivery to local subscribers happens when the
/// relay receives it back from the bus.
pub async fn publish(bus: &dyn MessageBus, topic: &str, message: &Value) -> Result<String, PublishError> {
    let topic = canonical_topic(topic)?;
    bus.publish(&topic, &message.to_string()).await?;
    debug!(topic = %topic, bus = bus.name(), "published");
    Ok(topic)
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub pattern: String,
    pub poll_interval: Duration,
    pub backoff: Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pattern: format!("{TOPIC_PREFIX}*"),
            poll_interval: Duration::from_secs(1),
            backoff: Duration::from_secs(1),
        }
    }
}

fn decode_payload(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn relay_one(topics: &TopicRegistry, msg: BusMessage) {
    let payload = decode_payload(&msg.payload);
    let report = topics.fanout(&msg.channel, &payload);
    debug!(
        topic = %msg.channel,
        delivered = report.delivered,
        dropped = report.dropped,
        "relayed"
    );
}

/// Runs until `token` is cancelled. Bus errors drop the subscription and
/// resubscribe after `cfg.backoff`.
pub async fn run_relay(
    bus: Arc<dyn MessageBus>,
    topics: Arc<TopicRegistry>,
    token: CancellationToken,
    cfg: RelayConfig,
) {
    info!(bus = bus.name(), pattern = %cfg.pattern, "relay started");
    'outer: while !token.is_cancelled() {
        let mut sub = match bus.subscribe(&cfg.pattern).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "relay subscribe failed, retrying");
                tokio::select! {
                    () = token.cancelled() => break 'outer,
                    () = tokio::time::sleep(cfg.backoff) => continue 'outer,
                }
            }
        };

        loop {
            let next = tokio::select! {
                () = token.cancelled() => break 'outer,
                next = sub.next_message(cfg.poll_interval) => next,
            };
            match next {
                Ok(Some(msg)) => relay_one(&topics, msg),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "relay subscription failed, resubscribing");
                    break;
                }
            }
        }

        drop(sub);
        tokio::select! {
            () = token.cancelled() => break 'outer,
            () = tokio::time::sleep(cfg.backoff) => {}
        }
    }
    info!("relay stopped");
}

pub fn spawn_relay(
    bus: Arc<dyn MessageBus>,
    topics: Arc<TopicRegistry>,
    token: CancellationToken,
    cfg: RelayConfig,
) -> JoinHandle<()> {
    tokio::spawn(run_relay(bus, topics, token, cfg))
}

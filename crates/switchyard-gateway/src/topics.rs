//! Topic subscriptions and local fanout.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use switchyard_core::ids::ConnectionId;

use crate::connection::ConnectionManager;

pub const TOPIC_PREFIX: &str = "topic:";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    #[error("topic name must not be empty")]
    Empty,
}

/// `orders` and `topic:orders` name the same topic.
pub fn canonical_topic(topic: &str) -> Result<String, TopicError> {
    let bare = topic.strip_prefix(TOPIC_PREFIX).unwrap_or(topic);
    if bare.is_empty() {
        return Err(TopicError::Empty);
    }
    Ok(format!("{TOPIC_PREFIX}{bare}"))
}

pub fn notification_frame(topic: &str, payload: &Value) -> String {
    json!({"type": "notification", "topic": topic, "payload": payload}).to_string()
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: usize,
    pub dropped: usize,
}

#[derive(Default)]
struct Inner {
    topics: HashMap<String, HashSet<ConnectionId>>,
    by_conn: HashMap<ConnectionId, HashSet<String>>,
}

impl Inner {
    fn remove(&mut self, topic: &str, conn: &ConnectionId) -> bool {
        let removed = match self.topics.get_mut(topic) {
            Some(subs) => {
                let removed = subs.remove(conn);
                if subs.is_empty() {
                    self.topics.remove(topic);
                }
                removed
            }
            None => false,
        };
        if let Some(owned) = self.by_conn.get_mut(conn) {
            owned.remove(topic);
            if owned.is_empty() {
                self.by_conn.remove(conn);
            }
        }
        removed
    }

    fn remove_connection(&mut self, conn: &ConnectionId) -> usize {
        let Some(owned) = self.by_conn.remove(conn) else {
            return 0;
        };
        for topic in &owned {
            if let Some(subs) = self.topics.get_mut(topic) {
                subs.remove(conn);
                if subs.is_empty() {
                    self.topics.remove(topic);
                }
            }
        }
        owned.len()
    }
}

/// Topic to subscriber map. Every operation takes the one registry lock and
/// no lock is held while frames are sent.
pub struct TopicRegistry {
    inner: Mutex<Inner>,
    connections: Arc<ConnectionManager>,
}

impl TopicRegistry {
    pub fn new(connections: Arc<ConnectionManager>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            connections,
        }
    }

    /// Returns the canonical topic and whether the subscription is new.
    pub fn subscribe(&self, topic: &str, conn: &ConnectionId) -> Result<(String, bool), TopicError> {
        let topic = canonical_topic(topic)?;
        let mut inner = self.inner.lock();
        let added = inner
            .topics
            .entry(topic.clone())
            .or_default()
            .insert(conn.clone());
        inner
            .by_conn
            .entry(conn.clone())
            .or_default()
            .insert(topic.clone());
        debug!(conn_id = %conn, topic = %topic, added, "subscribe");
        Ok((topic, added))
    }

    /// Returns the canonical topic and whether a subscription was removed.
    pub fn unsubscribe(&self, topic: &str, conn: &ConnectionId) -> Result<(String, bool), TopicError> {
        let topic = canonical_topic(topic)?;
        let removed = self.inner.lock().remove(&topic, conn);
        debug!(conn_id = %conn, topic = %topic, removed, "unsubscribe");
        Ok((topic, removed))
    }

    /// Send a notification to every local subscriber of `topic`.
    ///
    /// Subscribers whose send fails are removed from all topics and
    /// unregistered.
    pub fn fanout(&self, topic: &str, payload: &Value) -> FanoutReport {
        let Ok(topic) = canonical_topic(topic) else {
            return FanoutReport::default();
        };

        let targets: Vec<ConnectionId> = {
            let inner = self.inner.lock();
            match inner.topics.get(&topic) {
                Some(subs) => subs.iter().cloned().collect(),
                None => return FanoutReport::default(),
            }
        };

        let frame = notification_frame(&topic, payload);
        let mut report = FanoutReport::default();
        let mut failed = Vec::new();
        for conn in targets {
            match self.connections.send(&conn, frame.clone()) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(conn_id = %conn, topic = %topic, error = %e, "fanout send failed");
                    failed.push(conn);
                }
            }
        }

        if !failed.is_empty() {
            let mut inner = self.inner.lock();
            for conn in &failed {
                inner.remove_connection(conn);
            }
            drop(inner);
            for conn in &failed {
                self.connections.unregister(conn);
            }
        }
        report.dropped = failed.len();
        report
    }

    /// Remove `conn` from every topic. Returns how many subscriptions it had.
    pub fn cleanup_on_disconnect(&self, conn: &ConnectionId) -> usize {
        let n = self.inner.lock().remove_connection(conn);
        if n > 0 {
            debug!(conn_id = %conn, topics = n, "subscriptions cleared");
        }
        n
    }

    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        let Ok(topic) = canonical_topic(topic) else {
            return Vec::new();
        };
        self.inner
            .lock()
            .topics
            .get(&topic)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn topics_of(&self, conn: &ConnectionId) -> Vec<String> {
        let mut topics: Vec<String> = self
            .inner
            .lock()
            .by_conn
            .get(conn)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    pub fn topic_count(&self) -> usize {
        self.inner.lock().topics.len()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers(topic).len()
    }
}

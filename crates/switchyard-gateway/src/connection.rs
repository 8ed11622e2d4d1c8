use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use switchyard_core::ids::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("unknown connection")]
    Unknown,
    #[error("connection closed")]
    Closed,
    #[error("send queue full")]
    Full,
}

/// One live WebSocket peer. Frames go through a bounded queue drained by the
/// connection's writer task.
pub struct Connection {
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed) && !self.tx.is_closed()
    }

    fn try_send(&self, frame: String) -> Result<(), SendError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(SendError::Closed);
        }
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SendError::Full,
            mpsc::error::TrySendError::Closed(_) => SendError::Closed,
        })
    }
}

/// All live connections, keyed by id.
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, Arc<Connection>>,
    queue_size: usize,
}

impl ConnectionManager {
    pub fn new(queue_size: usize) -> Self {
        Self {
            connections: DashMap::new(),
            queue_size: queue_size.max(1),
        }
    }

    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.queue_size);
        let conn = Arc::new(Connection {
            tx,
            connected: AtomicBool::new(true),
        });
        self.connections.insert(id.clone(), conn);
        debug!(conn_id = %id, "connection registered");
        (id, rx)
    }

    /// Idempotent.
    pub fn unregister(&self, id: &ConnectionId) {
        if let Some((_, conn)) = self.connections.remove(id) {
            conn.connected.store(false, Ordering::Relaxed);
            debug!(conn_id = %id, "connection unregistered");
        }
    }

    /// Queue a frame without waiting.
    pub fn send(&self, id: &ConnectionId, frame: String) -> Result<(), SendError> {
        let conn = self
            .connections
            .get(id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(SendError::Unknown)?;
        let result = conn.try_send(frame);
        if let Err(SendError::Full) = result {
            warn!(conn_id = %id, "send queue full, dropping frame");
        }
        result
    }

    /// Queue a reply, waiting for space when the queue is full. Replies are
    /// never dropped while the connection is alive.
    pub async fn send_reply(&self, id: &ConnectionId, frame: String) -> Result<(), SendError> {
        let conn = self
            .connections
            .get(id)
            .map(|c| Arc::clone(c.value()))
            .ok_or(SendError::Unknown)?;
        if !conn.connected.load(Ordering::Relaxed) {
            return Err(SendError::Closed);
        }
        conn.tx.send(frame).await.map_err(|_| SendError::Closed)
    }

    /// Send to every connection. Connections that fail are unregistered.
    /// Returns how many accepted the frame.
    pub fn broadcast_all(&self, frame: &str) -> usize {
        let targets: Vec<(ConnectionId, Arc<Connection>)> = self
            .connections
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();

        let mut delivered = 0;
        for (id, conn) in targets {
            match conn.try_send(frame.to_string()) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    warn!(conn_id = %id, error = %e, "broadcast failed, dropping connection");
                    self.unregister(&id);
                }
            }
        }
        delivered
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    pub fn count(&self) -> usize {
        self.connections.len()
    }

    pub fn ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| e.key().clone()).collect()
    }
}

//! Connection registry: the concrete gateway behind every WebSocket task.
//!
//! Each registered connection owns an unbounded queue. The registry keeps the
//! sending half so other tasks can reach the connection; the socket task keeps
//! the receiving half inside its [`Registration`] and drains it to the wire.

use crate::traits::{ConnectionId, Gateway, TransportError};
use dashmap::DashMap;
use rendezvous_protocol::Frame;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Live connections and their outbound queues.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Frame>>,
    /// Number of reserved slots, kept separately so the limit holds under
    /// concurrent registration.
    active: AtomicUsize,
    max_connections: usize,
}

impl ConnectionRegistry {
    /// Create a registry that accepts at most `max_connections` connections.
    #[must_use]
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            active: AtomicUsize::new(0),
            max_connections,
        }
    }

    /// Register a new connection and allocate its handle.
    ///
    /// The returned [`Registration`] unregisters the connection when dropped.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionLimitReached`] if the registry is full.
    pub fn register(self: &Arc<Self>) -> Result<Registration, TransportError> {
        self.active
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_connections).then_some(n + 1)
            })
            .map_err(|_| {
                warn!(limit = self.max_connections, "Connection limit reached");
                TransportError::ConnectionLimitReached(self.max_connections)
            })?;

        let id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(id.clone(), tx);

        debug!(connection = %id, active = self.len(), "Connection registered");

        Ok(Registration {
            id,
            outbound: rx,
            registry: Arc::clone(self),
        })
    }

    /// Remove a connection. Returns `true` if it was registered.
    ///
    /// Frames still queued for the connection are dropped with its receiver.
    pub fn unregister(&self, id: &ConnectionId) -> bool {
        let removed = self.connections.remove(id).is_some();
        if removed {
            self.active.fetch_sub(1, Ordering::AcqRel);
            debug!(connection = %id, active = self.len(), "Connection unregistered");
        }
        removed
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Check if no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Configured connection limit.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }
}

impl Gateway for ConnectionRegistry {
    fn send(&self, connection: &ConnectionId, frame: Frame) -> bool {
        match self.connections.get(connection) {
            Some(tx) => {
                let queued = tx.send(frame).is_ok();
                if !queued {
                    trace!(connection = %connection, "Outbound queue closed");
                }
                queued
            }
            None => {
                trace!(connection = %connection, "Skipping send to unknown connection");
                false
            }
        }
    }

    fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.connections.contains_key(connection)
    }
}

/// A registered connection, held by the task that owns the socket.
#[derive(Debug)]
pub struct Registration {
    id: ConnectionId,
    outbound: mpsc::UnboundedReceiver<Frame>,
    registry: Arc<ConnectionRegistry>,
}

impl Registration {
    /// The connection's handle.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Wait for the next frame queued for this connection.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.outbound.recv().await
    }

    /// Take a queued frame without waiting.
    pub fn try_recv(&mut self) -> Option<Frame> {
        self.outbound.try_recv().ok()
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(&self.id);
    }
}

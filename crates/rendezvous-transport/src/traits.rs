//! Gateway abstraction traits for Rendezvous.
//!
//! These traits define what the room coordinator may ask of the layer that
//! owns client connections, so the coordinator never touches a socket.

use rendezvous_protocol::Frame;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Process-wide counter backing connection handles.
static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    /// Create a new connection ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Allocate a connection ID that no other live connection in this process uses.
    #[must_use]
    pub fn generate() -> Self {
        let n = NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed);
        Self(format!("conn_{:x}", n))
    }

    /// Get the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConnectionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConnectionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Transport errors.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The gateway already holds the maximum number of connections.
    #[error("Connection limit reached ({0})")]
    ConnectionLimitReached(usize),
}

/// Outbound side of the connection gateway.
///
/// Sends are fire-and-forget: a frame is queued for the connection's writer
/// and the call returns immediately. A connection that has already gone away
/// is skipped, which is reported through the return value, not as an error.
pub trait Gateway: Send + Sync {
    /// Queue a frame for a single connection.
    ///
    /// Returns `false` if the connection is no longer registered.
    fn send(&self, connection: &ConnectionId, frame: Frame) -> bool;

    /// Queue the same frame for several connections.
    ///
    /// Returns the number of connections the frame was queued for.
    fn broadcast(&self, connections: &[ConnectionId], frame: &Frame) -> usize {
        connections
            .iter()
            .filter(|connection| self.send(connection, frame.clone()))
            .count()
    }

    /// Check whether a connection is still registered.
    fn is_connected(&self, connection: &ConnectionId) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_connection_id_generation() {
        let id1 = ConnectionId::generate();
        let id2 = ConnectionId::generate();
        assert_ne!(id1, id2);
        assert!(id1.as_str().starts_with("conn_"));
    }

    #[test]
    fn test_connection_id_from_string() {
        let id: ConnectionId = "test-id".into();
        assert_eq!(id.as_str(), "test-id");
        assert_eq!(id.to_string(), "test-id");
    }

    struct Recorder {
        live: HashSet<ConnectionId>,
        sent: Mutex<Vec<(ConnectionId, Frame)>>,
    }

    impl Gateway for Recorder {
        fn send(&self, connection: &ConnectionId, frame: Frame) -> bool {
            if !self.live.contains(connection) {
                return false;
            }
            self.sent.lock().unwrap().push((connection.clone(), frame));
            true
        }

        fn is_connected(&self, connection: &ConnectionId) -> bool {
            self.live.contains(connection)
        }
    }

    #[test]
    fn test_default_broadcast_skips_gone_connections() {
        let live: HashSet<ConnectionId> = ["a".into(), "c".into()].into_iter().collect();
        let gateway = Recorder {
            live,
            sent: Mutex::new(Vec::new()),
        };

        let targets: Vec<ConnectionId> = vec!["a".into(), "b".into(), "c".into()];
        let delivered = gateway.broadcast(&targets, &Frame::ping());

        assert_eq!(delivered, 2);
        let sent = gateway.sent.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|(id, _)| id.as_str() != "b"));
    }
}

//! # rendezvous-transport
//!
//! The connection gateway for the Rendezvous signaling server.
//!
//! The gateway hands every accepted client an opaque [`ConnectionId`] and an
//! outbound queue. Anything that wants to reach a client (the room
//! coordinator, mostly) goes through the [`Gateway`] trait, which queues
//! frames without waiting for the socket.
//!
//! ```rust
//! use std::sync::Arc;
//! use rendezvous_protocol::Frame;
//! use rendezvous_transport::{ConnectionRegistry, Gateway};
//!
//! let registry = Arc::new(ConnectionRegistry::new(16));
//! let mut conn = registry.register().unwrap();
//!
//! assert!(registry.send(conn.id(), Frame::ping()));
//! assert_eq!(conn.try_recv(), Some(Frame::ping()));
//! ```

pub mod registry;
pub mod traits;

pub use registry::{ConnectionRegistry, Registration};
pub use traits::{ConnectionId, Gateway, TransportError};

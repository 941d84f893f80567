//! # Rendezvous Server
//!
//! WebSocket signaling server. Clients join named rooms and learn the peer
//! ids of everyone else in the room; the media and data connections
//! themselves are negotiated elsewhere, through the peer registry the
//! server advertises at `/peer-registry`.
//!
//! The binary wires these modules together; they are exposed as a library
//! so the integration tests can run a server in-process.

pub mod config;
pub mod handlers;
pub mod metrics;
pub mod service;

pub use config::Config;
pub use handlers::{build_router, run_server, serve, AppState};
pub use service::{CoordinatorHandle, ServiceError};

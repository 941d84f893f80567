//! # rendezvous-protocol
//!
//! Wire protocol definitions for the Rendezvous signaling server.
//!
//! Clients connect over WebSocket, ask to join a named room under the peer
//! identifier they obtained from the peer registry, and are told which peers
//! are already there and who comes and goes afterwards.
//!
//! ## Frame Types
//!
//! - `join-room` / `leave-room` - Room membership requests
//! - `joined-roster` / `user-joined` / `user-left` - Membership notifications
//! - `join-rejected` / `error` - Refusals and protocol errors
//! - `ping` / `pong` / `connected` - Connection housekeeping
//!
//! ## Example
//!
//! ```rust
//! use rendezvous_protocol::{Frame, codec};
//!
//! let frame = Frame::join_room("standup", "peer-7f3a");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! assert_eq!(codec::decode(&encoded).unwrap(), frame);
//!
//! let text = codec::encode_text(&frame).unwrap();
//! assert_eq!(codec::decode_text(&text).unwrap(), frame);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, encode, ProtocolError, WireFormat};
pub use frames::{error_codes, Frame, FrameType, RejectReason};
pub use version::{Version, VersionError, PROTOCOL_VERSION};

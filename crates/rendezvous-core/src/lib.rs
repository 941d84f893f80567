//! # rendezvous-core
//!
//! Room membership for the Rendezvous signaling server.
//!
//! - **Room** - a named group of connections and the peer ids they go by
//! - **RoomDirectory** - every room, indexed by name and by connection
//! - **Coordinator** - applies connection events to the directory and
//!   decides which clients hear about it
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐  Event   ┌─────────────┐        ┌───────────────┐
//! │  Gateway    │─────────▶│ Coordinator │───────▶│ RoomDirectory │
//! └─────────────┘          └─────────────┘        └───────────────┘
//!        ▲                        │
//!        └──── Vec<Outbound> ─────┘
//! ```
//!
//! ```rust
//! use rendezvous_core::{Coordinator, Event, Notification};
//! use rendezvous_transport::ConnectionId;
//!
//! let mut coordinator = Coordinator::default();
//! let alice = ConnectionId::from("conn_1");
//!
//! let out = coordinator.dispatch(&alice, Event::join("standup", "peer-alice"));
//! assert_eq!(
//!     out[0].notification,
//!     Notification::JoinedRoster { room: "standup".into(), peers: vec![] }
//! );
//! ```

pub mod coordinator;
pub mod directory;
pub mod event;
pub mod room;

pub use coordinator::{deliver, Coordinator, DeliveryReport};
pub use directory::{Departure, DirectoryConfig, DirectoryError, DirectoryStats, RoomDirectory};
pub use event::{Event, Notification, Outbound};
pub use room::{Member, MemberList, PeerId, Room, RoomName};

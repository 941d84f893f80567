//! Events the coordinator consumes and notifications it produces.

use crate::room::{PeerId, RoomName};
use rendezvous_protocol::{Frame, RejectReason};
use rendezvous_transport::ConnectionId;

/// Something that happened on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The connection was accepted.
    Connect,
    /// The client asked to join a room.
    JoinRoom { room: RoomName, peer_id: PeerId },
    /// The client asked to leave its room.
    LeaveRoom,
    /// The connection closed, for whatever reason.
    Disconnect,
}

impl Event {
    /// Create a JoinRoom event.
    #[must_use]
    pub fn join(room: impl Into<RoomName>, peer_id: impl Into<PeerId>) -> Self {
        Event::JoinRoom {
            room: room.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Map a client frame to the room event it requests.
    ///
    /// Returns `None` for frames that do not concern rooms.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match frame {
            Frame::JoinRoom { room, peer_id } => Some(Event::join(room.clone(), peer_id.clone())),
            Frame::LeaveRoom => Some(Event::LeaveRoom),
            _ => None,
        }
    }

    /// Short name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Event::Connect => "connect",
            Event::JoinRoom { .. } => "join-room",
            Event::LeaveRoom => "leave-room",
            Event::Disconnect => "disconnect",
        }
    }
}

/// A membership notification for one or more clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// The other members of a room the recipient just joined.
    JoinedRoster { room: RoomName, peers: Vec<PeerId> },
    /// A peer joined the recipient's room.
    UserJoined { room: RoomName, peer_id: PeerId },
    /// A peer left the recipient's room.
    UserLeft { room: RoomName, peer_id: PeerId },
    /// The recipient's join request was refused.
    JoinRejected {
        room: RoomName,
        reason: RejectReason,
        message: String,
    },
    /// The recipient left its room on request.
    Left { room: RoomName },
}

impl Notification {
    /// Short name for logs and metrics.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Notification::JoinedRoster { .. } => "joined-roster",
            Notification::UserJoined { .. } => "user-joined",
            Notification::UserLeft { .. } => "user-left",
            Notification::JoinRejected { .. } => "join-rejected",
            Notification::Left { .. } => "left",
        }
    }

    /// The frame that carries this notification.
    #[must_use]
    pub fn to_frame(&self) -> Frame {
        match self {
            Notification::JoinedRoster { room, peers } => {
                Frame::joined_roster(room.clone(), peers.clone())
            }
            Notification::UserJoined { room, peer_id } => {
                Frame::user_joined(room.clone(), peer_id.clone())
            }
            Notification::UserLeft { room, peer_id } => {
                Frame::user_left(room.clone(), peer_id.clone())
            }
            Notification::JoinRejected {
                room,
                reason,
                message,
            } => Frame::join_rejected(room.clone(), *reason, message.clone()),
            Notification::Left { room } => Frame::left(room.clone()),
        }
    }
}

/// A notification and the connections it is addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Recipients.
    pub recipients: Vec<ConnectionId>,
    /// What to tell them.
    pub notification: Notification,
}

impl Outbound {
    /// Address a notification to a single connection.
    #[must_use]
    pub fn to(connection: ConnectionId, notification: Notification) -> Self {
        Self {
            recipients: vec![connection],
            notification,
        }
    }

    /// Address a notification to several connections.
    #[must_use]
    pub fn to_all(recipients: Vec<ConnectionId>, notification: Notification) -> Self {
        Self {
            recipients,
            notification,
        }
    }
}

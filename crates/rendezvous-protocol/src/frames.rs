//! Frame types for the Rendezvous protocol.
//!
//! Frames are the fundamental unit of communication between a client and the
//! signaling server. The same enum is used for both directions; the server
//! rejects frames a client is not supposed to send.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    JoinRoom = 0x01,
    LeaveRoom = 0x02,
    JoinedRoster = 0x03,
    UserJoined = 0x04,
    UserLeft = 0x05,
    JoinRejected = 0x06,
    Left = 0x07,
    Error = 0x08,
    Ping = 0x09,
    Pong = 0x0A,
    Connected = 0x0B,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::JoinRoom),
            0x02 => Ok(FrameType::LeaveRoom),
            0x03 => Ok(FrameType::JoinedRoster),
            0x04 => Ok(FrameType::UserJoined),
            0x05 => Ok(FrameType::UserLeft),
            0x06 => Ok(FrameType::JoinRejected),
            0x07 => Ok(FrameType::Left),
            0x08 => Ok(FrameType::Error),
            0x09 => Ok(FrameType::Ping),
            0x0A => Ok(FrameType::Pong),
            0x0B => Ok(FrameType::Connected),
            _ => Err("Invalid frame type"),
        }
    }
}

/// Why a join request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectReason {
    /// The connection already occupies a room and must leave first.
    AlreadyMember,
    /// Another connection in the room already uses this peer identifier.
    PeerIdTaken,
    /// The room name failed validation.
    InvalidRoomName,
    /// The peer identifier failed validation.
    InvalidPeerId,
    /// The server holds the maximum number of rooms.
    RoomLimitReached,
    /// The room holds the maximum number of members.
    RoomFull,
}

impl RejectReason {
    /// Stable kebab-case label, matching the serialized form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::AlreadyMember => "already-member",
            RejectReason::PeerIdTaken => "peer-id-taken",
            RejectReason::InvalidRoomName => "invalid-room-name",
            RejectReason::InvalidPeerId => "invalid-peer-id",
            RejectReason::RoomLimitReached => "room-limit-reached",
            RejectReason::RoomFull => "room-full",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error codes carried by [`Frame::Error`].
pub mod error_codes {
    /// The frame could not be decoded.
    pub const MALFORMED_FRAME: u16 = 4000;
    /// The frame is valid but only the server may send it.
    pub const UNEXPECTED_FRAME: u16 = 4001;
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Ask to join a room under the given peer identifier.
    #[serde(rename = "join-room")]
    JoinRoom {
        /// Room name.
        room: String,
        /// Identifier obtained from the peer registry.
        peer_id: String,
    },

    /// Leave the current room.
    #[serde(rename = "leave-room")]
    LeaveRoom,

    /// Sent to a newcomer with the peers already in the room.
    #[serde(rename = "joined-roster")]
    JoinedRoster {
        /// Room that was joined.
        room: String,
        /// Peer identifiers of the other members.
        peers: Vec<String>,
    },

    /// A peer entered the room.
    #[serde(rename = "user-joined")]
    UserJoined {
        /// Room name.
        room: String,
        /// The newcomer's peer identifier.
        peer_id: String,
    },

    /// A peer left the room or disconnected.
    #[serde(rename = "user-left")]
    UserLeft {
        /// Room name.
        room: String,
        /// The departed peer identifier.
        peer_id: String,
    },

    /// A join request was refused.
    #[serde(rename = "join-rejected")]
    JoinRejected {
        /// Room the client tried to join.
        room: String,
        /// Machine-readable reason.
        reason: RejectReason,
        /// Human-readable message.
        message: String,
    },

    /// Confirms an explicit leave.
    #[serde(rename = "left")]
    Left {
        /// Room that was left.
        room: String,
    },

    /// Error response.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: u16,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        /// Optional timestamp.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        /// Echoed timestamp from ping.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Connection established response.
    #[serde(rename = "connected")]
    Connected {
        /// Connection handle assigned by the server.
        connection_id: String,
        /// Protocol version spoken by the server.
        version: String,
        /// Recommended heartbeat interval in milliseconds.
        heartbeat: u32,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::JoinRoom { .. } => FrameType::JoinRoom,
            Frame::LeaveRoom => FrameType::LeaveRoom,
            Frame::JoinedRoster { .. } => FrameType::JoinedRoster,
            Frame::UserJoined { .. } => FrameType::UserJoined,
            Frame::UserLeft { .. } => FrameType::UserLeft,
            Frame::JoinRejected { .. } => FrameType::JoinRejected,
            Frame::Left { .. } => FrameType::Left,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
            Frame::Connected { .. } => FrameType::Connected,
        }
    }

    /// Whether a client is allowed to send this frame.
    #[must_use]
    pub fn is_client_frame(&self) -> bool {
        matches!(
            self,
            Frame::JoinRoom { .. } | Frame::LeaveRoom | Frame::Ping { .. } | Frame::Pong { .. }
        )
    }

    /// Create a new JoinRoom frame.
    #[must_use]
    pub fn join_room(room: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Frame::JoinRoom {
            room: room.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Create a new LeaveRoom frame.
    #[must_use]
    pub fn leave_room() -> Self {
        Frame::LeaveRoom
    }

    /// Create a new JoinedRoster frame.
    #[must_use]
    pub fn joined_roster(room: impl Into<String>, peers: Vec<String>) -> Self {
        Frame::JoinedRoster {
            room: room.into(),
            peers,
        }
    }

    /// Create a new UserJoined frame.
    #[must_use]
    pub fn user_joined(room: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Frame::UserJoined {
            room: room.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Create a new UserLeft frame.
    #[must_use]
    pub fn user_left(room: impl Into<String>, peer_id: impl Into<String>) -> Self {
        Frame::UserLeft {
            room: room.into(),
            peer_id: peer_id.into(),
        }
    }

    /// Create a new JoinRejected frame.
    #[must_use]
    pub fn join_rejected(
        room: impl Into<String>,
        reason: RejectReason,
        message: impl Into<String>,
    ) -> Self {
        Frame::JoinRejected {
            room: room.into(),
            reason,
            message: message.into(),
        }
    }

    /// Create a new Left frame.
    #[must_use]
    pub fn left(room: impl Into<String>) -> Self {
        Frame::Left { room: room.into() }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Ping frame with timestamp.
    #[must_use]
    pub fn ping_with_timestamp(timestamp: u64) -> Self {
        Frame::Ping {
            timestamp: Some(timestamp),
        }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(
        connection_id: impl Into<String>,
        version: impl Into<String>,
        heartbeat: u32,
    ) -> Self {
        Frame::Connected {
            connection_id: connection_id.into(),
            version: version.into(),
            heartbeat,
        }
    }
}

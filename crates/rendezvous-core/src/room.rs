//! Room abstraction for Rendezvous.
//!
//! A room is a named group of connections that intend to open direct peer
//! connections to each other. Rooms only exist while they have members.

use rendezvous_transport::ConnectionId;
use std::collections::HashMap;
use tracing::debug;

/// Maximum room name length.
pub const MAX_ROOM_NAME_LENGTH: usize = 256;

/// Maximum peer identifier length.
pub const MAX_PEER_ID_LENGTH: usize = 256;

/// A room name.
pub type RoomName = String;

/// A peer identifier handed out by the peer registry.
pub type PeerId = String;

/// Validate a room name.
///
/// Room names are opaque to the server, so any non-empty string without
/// control characters is accepted, up to [`MAX_ROOM_NAME_LENGTH`] bytes.
///
/// # Errors
///
/// Returns an error message if the room name is invalid.
pub fn validate_room_name(name: &str) -> Result<(), &'static str> {
    if name.is_empty() {
        return Err("Room name cannot be empty");
    }
    if name.len() > MAX_ROOM_NAME_LENGTH {
        return Err("Room name too long");
    }
    if name.chars().any(char::is_control) {
        return Err("Room name contains control characters");
    }
    Ok(())
}

/// Validate a peer identifier.
///
/// Peer identifiers are opaque, so only emptiness, length and control
/// characters are checked.
///
/// # Errors
///
/// Returns an error message if the peer identifier is invalid.
pub fn validate_peer_id(peer_id: &str) -> Result<(), &'static str> {
    if peer_id.is_empty() {
        return Err("Peer id cannot be empty");
    }
    if peer_id.len() > MAX_PEER_ID_LENGTH {
        return Err("Peer id too long");
    }
    if peer_id.chars().any(char::is_control) {
        return Err("Peer id contains control characters");
    }
    Ok(())
}

/// One connection's occupancy of a room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Member {
    /// Gateway handle of the member's connection.
    pub connection: ConnectionId,
    /// Peer identifier other members use to reach it.
    pub peer_id: PeerId,
}

impl Member {
    /// Create a new member.
    #[must_use]
    pub fn new(connection: ConnectionId, peer_id: impl Into<PeerId>) -> Self {
        Self {
            connection,
            peer_id: peer_id.into(),
        }
    }
}

/// Snapshot of a room's members.
pub type MemberList = Vec<Member>;

/// A room and its members.
#[derive(Debug, Clone)]
pub struct Room {
    name: RoomName,
    /// Members keyed by connection.
    members: HashMap<ConnectionId, PeerId>,
}

impl Room {
    /// Create an empty room.
    #[must_use]
    pub fn new(name: impl Into<RoomName>) -> Self {
        Self {
            name: name.into(),
            members: HashMap::new(),
        }
    }

    /// Get the room name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the room has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Check if a connection is a member.
    #[must_use]
    pub fn contains(&self, connection: &ConnectionId) -> bool {
        self.members.contains_key(connection)
    }

    /// Check if a peer identifier is in use by any member.
    #[must_use]
    pub fn has_peer(&self, peer_id: &str) -> bool {
        self.members.values().any(|p| p == peer_id)
    }

    /// Peer identifier of a member.
    #[must_use]
    pub fn peer_of(&self, connection: &ConnectionId) -> Option<&str> {
        self.members.get(connection).map(String::as_str)
    }

    pub(crate) fn insert(&mut self, connection: ConnectionId, peer_id: PeerId) {
        debug!(room = %self.name, connection = %connection, peer = %peer_id, "Member added");
        self.members.insert(connection, peer_id);
    }

    pub(crate) fn remove(&mut self, connection: &ConnectionId) -> Option<PeerId> {
        let removed = self.members.remove(connection);
        if removed.is_some() {
            debug!(room = %self.name, connection = %connection, "Member removed");
        }
        removed
    }

    /// All members.
    #[must_use]
    pub fn members(&self) -> MemberList {
        self.members
            .iter()
            .map(|(connection, peer_id)| Member::new(connection.clone(), peer_id.clone()))
            .collect()
    }

    /// Connections of all members.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionId> {
        self.members.keys().cloned().collect()
    }

    /// Peer identifiers of all members, sorted.
    #[must_use]
    pub fn peer_ids(&self) -> Vec<PeerId> {
        let mut peers: Vec<PeerId> = self.members.values().cloned().collect();
        peers.sort();
        peers
    }
}

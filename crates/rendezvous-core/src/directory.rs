//! The room directory: who is in which room.
//!
//! Membership is indexed twice. The primary index maps a connection to its
//! room so disconnect cleanup is a single lookup; the secondary index maps a
//! room to its members so broadcast targets are a single lookup. Every
//! mutation goes through `&mut self` and touches both indices before
//! returning, so no caller can observe one without the other.

use crate::room::{
    validate_peer_id, validate_room_name, Member, MemberList, PeerId, Room, RoomName,
};
use rendezvous_protocol::RejectReason;
use rendezvous_transport::ConnectionId;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// Reasons a join is refused.
///
/// Leaving a room the connection is not in, or looking up a room that does
/// not exist, are not errors: they yield `None` and an empty roster.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The connection already occupies a room.
    #[error("Already a member of room {0}")]
    AlreadyMember(RoomName),

    /// Another member of the room uses the same peer identifier.
    #[error("Peer id {peer_id} is already in use in room {room}")]
    PeerIdTaken { room: RoomName, peer_id: PeerId },

    /// Invalid room name.
    #[error("Invalid room name: {0}")]
    InvalidRoomName(&'static str),

    /// Invalid peer identifier.
    #[error("Invalid peer id: {0}")]
    InvalidPeerId(&'static str),

    /// Maximum number of rooms reached.
    #[error("Maximum number of rooms reached")]
    RoomLimitReached,

    /// The room has no free slot.
    #[error("Room {0} is full")]
    RoomFull(RoomName),
}

impl DirectoryError {
    /// The wire-level reason for this error.
    #[must_use]
    pub fn reason(&self) -> RejectReason {
        match self {
            DirectoryError::AlreadyMember(_) => RejectReason::AlreadyMember,
            DirectoryError::PeerIdTaken { .. } => RejectReason::PeerIdTaken,
            DirectoryError::InvalidRoomName(_) => RejectReason::InvalidRoomName,
            DirectoryError::InvalidPeerId(_) => RejectReason::InvalidPeerId,
            DirectoryError::RoomLimitReached => RejectReason::RoomLimitReached,
            DirectoryError::RoomFull(_) => RejectReason::RoomFull,
        }
    }
}

/// Directory limits.
#[derive(Debug, Clone)]
pub struct DirectoryConfig {
    /// Maximum number of rooms alive at once.
    pub max_rooms: usize,
    /// Maximum members per room.
    pub max_members_per_room: usize,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            max_rooms: 10_000,
            max_members_per_room: 64,
        }
    }
}

/// Primary index entry.
#[derive(Debug, Clone)]
struct Membership {
    room: RoomName,
    peer_id: PeerId,
}

/// Result of removing a connection from its room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Departure {
    /// Room the connection was removed from.
    pub room: RoomName,
    /// The member that left.
    pub member: Member,
    /// Members still in the room. Empty if the room was destroyed.
    pub remaining: MemberList,
}

/// In-memory mapping from room names to members.
#[derive(Debug, Default)]
pub struct RoomDirectory {
    /// connection -> room it occupies.
    memberships: HashMap<ConnectionId, Membership>,
    /// room -> members. Never holds an empty room.
    rooms: HashMap<RoomName, Room>,
    config: DirectoryConfig,
}

impl RoomDirectory {
    /// Create an empty directory with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(DirectoryConfig::default())
    }

    /// Create an empty directory with custom limits.
    #[must_use]
    pub fn with_config(config: DirectoryConfig) -> Self {
        info!("Creating room directory with config: {:?}", config);
        Self {
            memberships: HashMap::new(),
            rooms: HashMap::new(),
            config,
        }
    }

    /// Add a connection to a room, creating the room if needed.
    ///
    /// Returns every member of the room afterwards, the newcomer included.
    ///
    /// # Errors
    ///
    /// Fails without changing any state if the connection already occupies a
    /// room, the peer id is taken in the target room, either name is invalid,
    /// or a limit would be exceeded.
    pub fn join(
        &mut self,
        room_name: &str,
        connection: &ConnectionId,
        peer_id: &str,
    ) -> Result<MemberList, DirectoryError> {
        if let Some(existing) = self.memberships.get(connection) {
            return Err(DirectoryError::AlreadyMember(existing.room.clone()));
        }
        validate_room_name(room_name).map_err(DirectoryError::InvalidRoomName)?;
        validate_peer_id(peer_id).map_err(DirectoryError::InvalidPeerId)?;

        match self.rooms.get(room_name) {
            Some(room) => {
                if room.has_peer(peer_id) {
                    return Err(DirectoryError::PeerIdTaken {
                        room: room_name.to_string(),
                        peer_id: peer_id.to_string(),
                    });
                }
                if room.len() >= self.config.max_members_per_room {
                    return Err(DirectoryError::RoomFull(room_name.to_string()));
                }
            }
            None => {
                if self.rooms.len() >= self.config.max_rooms {
                    return Err(DirectoryError::RoomLimitReached);
                }
            }
        }

        let room = self.rooms.entry(room_name.to_string()).or_insert_with(|| {
            debug!(room = %room_name, "Creating room");
            Room::new(room_name)
        });
        room.insert(connection.clone(), peer_id.to_string());
        let members = room.members();

        self.memberships.insert(
            connection.clone(),
            Membership {
                room: room_name.to_string(),
                peer_id: peer_id.to_string(),
            },
        );

        debug_assert!(self.is_consistent());
        Ok(members)
    }

    /// Remove a connection from whichever room it occupies.
    ///
    /// Returns `None` if the connection is not a member of any room, which
    /// makes repeated calls harmless.
    pub fn leave(&mut self, connection: &ConnectionId) -> Option<Departure> {
        let membership = self.memberships.remove(connection)?;

        let remaining = match self.rooms.get_mut(&membership.room) {
            Some(room) => {
                room.remove(connection);
                if room.is_empty() {
                    self.rooms.remove(&membership.room);
                    debug!(room = %membership.room, "Destroyed empty room");
                    Vec::new()
                } else {
                    room.members()
                }
            }
            None => Vec::new(),
        };

        debug_assert!(self.is_consistent());
        Some(Departure {
            room: membership.room,
            member: Member::new(connection.clone(), membership.peer_id),
            remaining,
        })
    }

    /// Snapshot of a room's members. Unknown rooms yield an empty list.
    #[must_use]
    pub fn lookup(&self, room_name: &str) -> MemberList {
        self.rooms
            .get(room_name)
            .map(Room::members)
            .unwrap_or_default()
    }

    /// Sorted peer identifiers in a room. Unknown rooms yield an empty list.
    #[must_use]
    pub fn peer_ids(&self, room_name: &str) -> Vec<PeerId> {
        self.rooms
            .get(room_name)
            .map(Room::peer_ids)
            .unwrap_or_default()
    }

    /// The room a connection occupies, if any.
    #[must_use]
    pub fn room_of(&self, connection: &ConnectionId) -> Option<&str> {
        self.memberships.get(connection).map(|m| m.room.as_str())
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains_room(&self, room_name: &str) -> bool {
        self.rooms.contains_key(room_name)
    }

    /// Names of all rooms.
    #[must_use]
    pub fn room_names(&self) -> Vec<RoomName> {
        self.rooms.keys().cloned().collect()
    }

    /// Directory statistics.
    #[must_use]
    pub fn stats(&self) -> DirectoryStats {
        DirectoryStats {
            room_count: self.rooms.len(),
            member_count: self.memberships.len(),
        }
    }

    /// Check that the two indices agree.
    ///
    /// A connection is in room R's member set iff the primary index maps it to
    /// R with the same peer id, and no room is empty.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let forward = self.memberships.iter().all(|(connection, membership)| {
            self.rooms
                .get(&membership.room)
                .and_then(|room| room.peer_of(connection))
                == Some(membership.peer_id.as_str())
        });
        let members_in_rooms: usize = self.rooms.values().map(Room::len).sum();
        let no_empty_rooms = self.rooms.values().all(|room| !room.is_empty());

        forward && no_empty_rooms && members_in_rooms == self.memberships.len()
    }
}

/// Directory statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    /// Number of live rooms.
    pub room_count: usize,
    /// Number of connections that occupy a room.
    pub member_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    fn peers(members: &MemberList) -> Vec<&str> {
        let mut peers: Vec<&str> = members.iter().map(|m| m.peer_id.as_str()).collect();
        peers.sort_unstable();
        peers
    }

    #[test]
    fn test_join_creates_room_with_one_member() {
        let mut directory = RoomDirectory::new();

        let members = directory.join("r1", &conn("c1"), "peer-a").unwrap();
        assert_eq!(members, vec![Member::new(conn("c1"), "peer-a")]);
        assert!(directory.contains_room("r1"));
        assert_eq!(directory.room_of(&conn("c1")), Some("r1"));
    }

    #[test]
    fn test_join_returns_full_membership() {
        let mut directory = RoomDirectory::new();
        directory.join("r1", &conn("c1"), "peer-a").unwrap();

        let members = directory.join("r1", &conn("c2"), "peer-b").unwrap();
        assert_eq!(peers(&members), vec!["peer-a", "peer-b"]);
        assert_eq!(directory.peer_ids("r1"), vec!["peer-a", "peer-b"]);
    }

    #[test]
    fn test_last_leave_destroys_room() {
        let mut directory = RoomDirectory::new();
        directory.join("r1", &conn("c1"), "peer-a").unwrap();

        let departure = directory.leave(&conn("c1")).unwrap();
        assert_eq!(departure.room, "r1");
        assert_eq!(departure.member, Member::new(conn("c1"), "peer-a"));
        assert!(departure.remaining.is_empty());

        assert!(!directory.contains_room("r1"));
        assert!(directory.lookup("r1").is_empty());

        // Recreated fresh by a later join.
        let members = directory.join("r1", &conn("c9"), "peer-z").unwrap();
        assert_eq!(peers(&members), vec!["peer-z"]);
    }

    #[test]
    fn test_leave_reports_remaining_members() {
        let mut directory = RoomDirectory::new();
        directory.join("r1", &conn("c1"), "peer-a").unwrap();
        directory.join("r1", &conn("c2"), "peer-b").unwrap();
        directory.join("r1", &conn("c3"), "peer-c").unwrap();

        let departure = directory.leave(&conn("c2")).unwrap();
        assert_eq!(peers(&departure.remaining), vec!["peer-a", "peer-c"]);
        assert_eq!(directory.peer_ids("r1"), vec!["peer-a", "peer-c"]);
    }

    #[test]
    fn test_cannot_join_two_rooms() {
        let mut directory = RoomDirectory::new();
        directory.join("r1", &conn("c1"), "peer-a").unwrap();

        assert_eq!(
            directory.join("r2", &conn("c1"), "peer-a"),
            Err(DirectoryError::AlreadyMember("r1".into()))
        );
        assert_eq!(
            directory.join("r1", &conn("c1"), "peer-a"),
            Err(DirectoryError::AlreadyMember("r1".into()))
        );

        assert!(!directory.contains_room("r2"));
        assert_eq!(directory.room_of(&conn("c1")), Some("r1"));
        assert_eq!(directory.peer_ids("r1"), vec!["peer-a"]);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut directory = RoomDirectory::new();
        directory.join("r1", &conn("c1"), "peer-a").unwrap();
        directory.join("r1", &conn("c2"), "peer-b").unwrap();

        assert!(directory.leave(&conn("c1")).is_some());
        let after_first = directory.stats();

        assert!(directory.leave(&conn("c1")).is_none());
        assert_eq!(directory.stats(), after_first);
        assert_eq!(directory.peer_ids("r1"), vec!["peer-b"]);
    }

    #[test]
    fn test_leave_without_membership() {
        let mut directory = RoomDirectory::new();
        assert!(directory.leave(&conn("never-joined")).is_none());
        assert_eq!(directory.stats(), DirectoryStats::default());
    }

    #[test]
    fn test_peer_id_unique_within_room() {
        let mut directory = RoomDirectory::new();
        directory.join("r1", &conn("c1"), "peer-a").unwrap();

        assert!(matches!(
            directory.join("r1", &conn("c2"), "peer-a"),
            Err(DirectoryError::PeerIdTaken { .. })
        ));
        assert_eq!(directory.room_of(&conn("c2")), None);

        // The same peer id is fine in another room.
        assert!(directory.join("r2", &conn("c2"), "peer-a").is_ok());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let mut directory = RoomDirectory::new();

        assert!(matches!(
            directory.join("", &conn("c1"), "peer-a"),
            Err(DirectoryError::InvalidRoomName(_))
        ));
        assert!(matches!(
            directory.join("r1", &conn("c1"), ""),
            Err(DirectoryError::InvalidPeerId(_))
        ));
        assert_eq!(directory.stats(), DirectoryStats::default());
    }

    #[test]
    fn test_limits() {
        let mut directory = RoomDirectory::with_config(DirectoryConfig {
            max_rooms: 1,
            max_members_per_room: 2,
        });
        directory.join("r1", &conn("c1"), "peer-a").unwrap();
        directory.join("r1", &conn("c2"), "peer-b").unwrap();

        assert_eq!(
            directory.join("r1", &conn("c3"), "peer-c"),
            Err(DirectoryError::RoomFull("r1".into()))
        );
        assert_eq!(
            directory.join("r2", &conn("c3"), "peer-c"),
            Err(DirectoryError::RoomLimitReached)
        );

        directory.leave(&conn("c1"));
        directory.leave(&conn("c2"));
        assert!(directory.join("r2", &conn("c3"), "peer-c").is_ok());
    }

    #[test]
    fn test_error_reasons() {
        assert_eq!(
            DirectoryError::AlreadyMember("r".into()).reason(),
            RejectReason::AlreadyMember
        );
        assert_eq!(
            DirectoryError::RoomFull("r".into()).reason(),
            RejectReason::RoomFull
        );
        assert_eq!(
            DirectoryError::RoomLimitReached.reason(),
            RejectReason::RoomLimitReached
        );
    }

    #[test]
    fn test_indices_stay_consistent() {
        let mut directory = RoomDirectory::with_config(DirectoryConfig {
            max_rooms: 4,
            max_members_per_room: 5,
        });
        let rooms = ["r0", "r1", "r2", "r3", "r4"];

        // Linear congruential sequence, so the interleaving is varied but
        // reproducible.
        let mut state: u64 = 0x2545_f491;
        for step in 0..5_000 {
            state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let connection = conn(&format!("c{}", (state >> 33) % 24));
            let room = rooms[((state >> 17) % rooms.len() as u64) as usize];
            let peer = format!("peer-{}", (state >> 40) % 12);

            if (state >> 8) % 3 == 0 {
                let was_member = directory.room_of(&connection).is_some();
                assert_eq!(directory.leave(&connection).is_some(), was_member);
            } else {
                let _ = directory.join(room, &connection, &peer);
            }

            assert!(directory.is_consistent(), "inconsistent after step {step}");
            assert!(directory.stats().room_count <= 4);
            for name in directory.room_names() {
                let members = directory.lookup(&name);
                assert!(!members.is_empty());
                assert!(members.len() <= 5);
                for member in members {
                    assert_eq!(directory.room_of(&member.connection), Some(name.as_str()));
                }
            }
        }
    }
}

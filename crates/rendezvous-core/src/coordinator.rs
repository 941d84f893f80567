//! The room coordinator.
//!
//! Turns connection events into directory mutations and decides who hears
//! about them. [`Coordinator::dispatch`] never touches the network: it returns
//! the notifications to send, and [`deliver`] hands them to a [`Gateway`].

use crate::directory::{DirectoryStats, RoomDirectory};
use crate::event::{Event, Notification, Outbound};
use crate::room::{MemberList, PeerId};
use rendezvous_transport::{ConnectionId, Gateway};
use tracing::{debug, info, trace, warn};

/// Owns the room directory and applies events to it.
///
/// Meant to be owned by a single task that processes events one at a time;
/// that task is the only writer of the directory.
#[derive(Debug, Default)]
pub struct Coordinator {
    directory: RoomDirectory,
}

impl Coordinator {
    /// Create a coordinator around an existing directory.
    #[must_use]
    pub fn new(directory: RoomDirectory) -> Self {
        Self { directory }
    }

    /// Read access to the directory.
    #[must_use]
    pub fn directory(&self) -> &RoomDirectory {
        &self.directory
    }

    /// Sorted peer identifiers currently in a room.
    #[must_use]
    pub fn lookup(&self, room: &str) -> Vec<PeerId> {
        self.directory.peer_ids(room)
    }

    /// Directory statistics.
    #[must_use]
    pub fn stats(&self) -> DirectoryStats {
        self.directory.stats()
    }

    /// Apply one event from `connection` and return the notifications it causes.
    pub fn dispatch(&mut self, connection: &ConnectionId, event: Event) -> Vec<Outbound> {
        trace!(connection = %connection, event = event.name(), "Dispatching event");

        match event {
            Event::Connect => {
                debug!(connection = %connection, "Connection opened");
                Vec::new()
            }
            Event::JoinRoom { room, peer_id } => self.join(connection, room, peer_id),
            Event::LeaveRoom => self.leave(connection, true),
            Event::Disconnect => {
                debug!(connection = %connection, "Connection closed");
                self.leave(connection, false)
            }
        }
    }

    fn join(&mut self, connection: &ConnectionId, room: String, peer_id: PeerId) -> Vec<Outbound> {
        let members = match self.directory.join(&room, connection, &peer_id) {
            Ok(members) => members,
            Err(e) => {
                warn!(connection = %connection, room = %room, error = %e, "Join rejected");
                return vec![Outbound::to(
                    connection.clone(),
                    Notification::JoinRejected {
                        room,
                        reason: e.reason(),
                        message: e.to_string(),
                    },
                )];
            }
        };

        let (others, peers) = split_others(members, connection);

        info!(
            connection = %connection,
            room = %room,
            peer = %peer_id,
            members = others.len() + 1,
            "Joined room"
        );

        let mut outbound = vec![Outbound::to(
            connection.clone(),
            Notification::JoinedRoster {
                room: room.clone(),
                peers,
            },
        )];
        if !others.is_empty() {
            outbound.push(Outbound::to_all(
                others,
                Notification::UserJoined { room, peer_id },
            ));
        }
        outbound
    }

    fn leave(&mut self, connection: &ConnectionId, explicit: bool) -> Vec<Outbound> {
        let Some(departure) = self.directory.leave(connection) else {
            trace!(connection = %connection, "Not in any room");
            return Vec::new();
        };

        info!(
            connection = %connection,
            room = %departure.room,
            peer = %departure.member.peer_id,
            remaining = departure.remaining.len(),
            explicit,
            "Left room"
        );

        let mut outbound = Vec::with_capacity(2);
        if explicit {
            outbound.push(Outbound::to(
                connection.clone(),
                Notification::Left {
                    room: departure.room.clone(),
                },
            ));
        }
        if !departure.remaining.is_empty() {
            let recipients = departure
                .remaining
                .into_iter()
                .map(|member| member.connection)
                .collect();
            outbound.push(Outbound::to_all(
                recipients,
                Notification::UserLeft {
                    room: departure.room,
                    peer_id: departure.member.peer_id,
                },
            ));
        }
        outbound
    }
}

/// Separate the newcomer from a fresh member list.
///
/// Returns the other members' connections and their sorted peer ids.
fn split_others(members: MemberList, newcomer: &ConnectionId) -> (Vec<ConnectionId>, Vec<PeerId>) {
    let mut connections = Vec::with_capacity(members.len());
    let mut peers = Vec::with_capacity(members.len());
    for member in members {
        if &member.connection != newcomer {
            connections.push(member.connection);
            peers.push(member.peer_id);
        }
    }
    peers.sort();
    (connections, peers)
}

/// Outcome of handing notifications to the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Frames queued for live connections.
    pub queued: usize,
    /// Recipients that were already gone.
    pub skipped: usize,
}

/// Queue notifications on the gateway.
///
/// Recipients that have disconnected in the meantime are skipped.
pub fn deliver(outbound: &[Outbound], gateway: &dyn Gateway) -> DeliveryReport {
    let mut report = DeliveryReport::default();
    for item in outbound {
        let frame = item.notification.to_frame();
        let queued = gateway.broadcast(&item.recipients, &frame);
        report.queued += queued;
        report.skipped += item.recipients.len() - queued;

        trace!(
            notification = item.notification.name(),
            recipients = item.recipients.len(),
            queued,
            "Delivered notification"
        );
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::DirectoryConfig;
    use rendezvous_protocol::{Frame, RejectReason};
    use rendezvous_transport::ConnectionRegistry;
    use std::sync::Arc;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::from(id)
    }

    /// Notifications addressed to one connection, in order.
    fn received(outbound: &[Outbound], connection: &str) -> Vec<Notification> {
        outbound
            .iter()
            .filter(|o| o.recipients.iter().any(|r| r.as_str() == connection))
            .map(|o| o.notification.clone())
            .collect()
    }

    #[test]
    fn test_connect_is_silent() {
        let mut coordinator = Coordinator::default();
        assert!(coordinator.dispatch(&conn("a"), Event::Connect).is_empty());
        assert_eq!(coordinator.stats(), DirectoryStats::default());
    }

    #[test]
    fn test_two_client_scenario() {
        let mut coordinator = Coordinator::default();
        let (a, b) = (conn("a"), conn("b"));

        coordinator.dispatch(&a, Event::Connect);
        let out = coordinator.dispatch(&a, Event::join("r1", "peerA"));
        assert_eq!(
            out,
            vec![Outbound::to(
                a.clone(),
                Notification::JoinedRoster {
                    room: "r1".into(),
                    peers: vec![],
                }
            )]
        );

        coordinator.dispatch(&b, Event::Connect);
        let out = coordinator.dispatch(&b, Event::join("r1", "peerB"));
        assert_eq!(
            received(&out, "b"),
            vec![Notification::JoinedRoster {
                room: "r1".into(),
                peers: vec!["peerA".into()],
            }]
        );
        assert_eq!(
            received(&out, "a"),
            vec![Notification::UserJoined {
                room: "r1".into(),
                peer_id: "peerB".into(),
            }]
        );

        let out = coordinator.dispatch(&a, Event::Disconnect);
        assert_eq!(
            out,
            vec![Outbound::to_all(
                vec![b.clone()],
                Notification::UserLeft {
                    room: "r1".into(),
                    peer_id: "peerA".into(),
                }
            )]
        );
        assert_eq!(coordinator.lookup("r1"), vec!["peerB"]);

        let out = coordinator.dispatch(&b, Event::Disconnect);
        assert!(out.is_empty());
        assert!(!coordinator.directory().contains_room("r1"));
    }

    #[test]
    fn test_double_join_rejected() {
        let mut coordinator = Coordinator::default();
        let c = conn("c");

        coordinator.dispatch(&c, Event::join("r2", "peerC"));
        let out = coordinator.dispatch(&c, Event::join("r2", "peerC"));

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].recipients, vec![c.clone()]);
        assert!(matches!(
            out[0].notification,
            Notification::JoinRejected {
                reason: RejectReason::AlreadyMember,
                ..
            }
        ));
        assert_eq!(coordinator.lookup("r2"), vec!["peerC"]);
        assert_eq!(coordinator.stats().member_count, 1);
    }

    #[test]
    fn test_rejection_does_not_notify_room() {
        let mut coordinator = Coordinator::default();
        coordinator.dispatch(&conn("a"), Event::join("r1", "peerA"));

        let out = coordinator.dispatch(&conn("b"), Event::join("r1", "peerA"));
        assert!(received(&out, "a").is_empty());
        assert!(matches!(
            received(&out, "b")[..],
            [Notification::JoinRejected {
                reason: RejectReason::PeerIdTaken,
                ..
            }]
        ));
    }

    #[test]
    fn test_disconnect_notifies_each_remaining_member_once() {
        let mut coordinator = Coordinator::default();
        for (id, peer) in [("a", "pa"), ("b", "pb"), ("c", "pc"), ("d", "pd")] {
            coordinator.dispatch(&conn(id), Event::join("room", peer));
        }

        let out = coordinator.dispatch(&conn("b"), Event::Disconnect);
        for other in ["a", "c", "d"] {
            assert_eq!(
                received(&out, other),
                vec![Notification::UserLeft {
                    room: "room".into(),
                    peer_id: "pb".into(),
                }]
            );
        }
        assert!(received(&out, "b").is_empty());
    }

    #[test]
    fn test_disconnect_without_join_is_silent() {
        let mut coordinator = Coordinator::default();
        coordinator.dispatch(&conn("x"), Event::Connect);
        assert!(coordinator.dispatch(&conn("x"), Event::Disconnect).is_empty());
        assert!(coordinator.dispatch(&conn("x"), Event::LeaveRoom).is_empty());
    }

    #[test]
    fn test_explicit_leave_then_rejoin_elsewhere() {
        let mut coordinator = Coordinator::default();
        coordinator.dispatch(&conn("a"), Event::join("r1", "pa"));
        coordinator.dispatch(&conn("b"), Event::join("r1", "pb"));

        let out = coordinator.dispatch(&conn("a"), Event::LeaveRoom);
        assert_eq!(
            received(&out, "a"),
            vec![Notification::Left { room: "r1".into() }]
        );
        assert_eq!(
            received(&out, "b"),
            vec![Notification::UserLeft {
                room: "r1".into(),
                peer_id: "pa".into(),
            }]
        );

        // Second leave and the later disconnect are no-ops.
        assert!(coordinator.dispatch(&conn("a"), Event::LeaveRoom).is_empty());

        let out = coordinator.dispatch(&conn("a"), Event::join("r2", "pa"));
        assert_eq!(
            received(&out, "a"),
            vec![Notification::JoinedRoster {
                room: "r2".into(),
                peers: vec![],
            }]
        );
        assert!(received(&out, "b").is_empty());
    }

    #[test]
    fn test_roster_is_sorted_and_excludes_newcomer() {
        let mut coordinator = Coordinator::default();
        for (id, peer) in [("a", "zeta"), ("b", "alpha"), ("c", "mu")] {
            coordinator.dispatch(&conn(id), Event::join("room", peer));
        }

        let out = coordinator.dispatch(&conn("d"), Event::join("room", "omega"));
        assert_eq!(
            received(&out, "d"),
            vec![Notification::JoinedRoster {
                room: "room".into(),
                peers: vec!["alpha".into(), "mu".into(), "zeta".into()],
            }]
        );
        assert_eq!(out[1].recipients.len(), 3);
    }

    #[test]
    fn test_room_names_are_opaque() {
        let mut coordinator = Coordinator::default();

        for (id, room) in [("a", "R\u{e9}union"), ("b", "\u{4f1a}\u{8b70}"), ("c", "$team")] {
            let out = coordinator.dispatch(&conn(id), Event::join(room, "peer"));
            assert_eq!(
                received(&out, id),
                vec![Notification::JoinedRoster {
                    room: room.into(),
                    peers: vec![],
                }]
            );
            assert_eq!(coordinator.lookup(room), vec!["peer"]);
        }
    }

    #[test]
    fn test_room_full_rejected() {
        let mut coordinator = Coordinator::new(RoomDirectory::with_config(DirectoryConfig {
            max_rooms: 10,
            max_members_per_room: 1,
        }));
        coordinator.dispatch(&conn("a"), Event::join("r1", "pa"));

        let out = coordinator.dispatch(&conn("b"), Event::join("r1", "pb"));
        assert!(matches!(
            received(&out, "b")[..],
            [Notification::JoinRejected {
                reason: RejectReason::RoomFull,
                ..
            }]
        ));
    }

    #[test]
    fn test_deliver_skips_gone_connections() {
        let registry = Arc::new(ConnectionRegistry::new(8));
        let mut a = registry.register().unwrap();
        let b = registry.register().unwrap();
        let gone = b.id().clone();
        drop(b);

        let outbound = vec![Outbound::to_all(
            vec![a.id().clone(), gone],
            Notification::UserLeft {
                room: "r1".into(),
                peer_id: "pc".into(),
            },
        )];
        let report = deliver(&outbound, registry.as_ref());

        assert_eq!(report, DeliveryReport { queued: 1, skipped: 1 });
        assert_eq!(a.try_recv(), Some(Frame::user_left("r1", "pc")));
    }
}

//! The coordinator task.
//!
//! All connection tasks funnel their events into one queue, and a single
//! task drains it, so room state is only ever touched by one thread and
//! events from one connection are applied in the order they were read.

use crate::metrics;
use rendezvous_core::{deliver, Coordinator, DirectoryStats, Event, Notification, PeerId};
use rendezvous_transport::{ConnectionId, Gateway};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Errors from talking to the coordinator task.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The coordinator task has exited.
    #[error("Coordinator is not running")]
    Stopped,
}

/// Work for the coordinator task.
#[derive(Debug)]
pub enum Command {
    /// Apply an event from a connection.
    Event {
        connection: ConnectionId,
        event: Event,
    },
    /// Report the peers currently in a room.
    Lookup {
        room: String,
        reply: oneshot::Sender<Vec<PeerId>>,
    },
    /// Report directory statistics.
    Stats {
        reply: oneshot::Sender<DirectoryStats>,
    },
}

/// Cheap handle for submitting work to the coordinator task.
#[derive(Debug, Clone)]
pub struct CoordinatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl CoordinatorHandle {
    /// Queue an event. Never waits.
    ///
    /// Returns `false` if the coordinator task has exited.
    pub fn submit(&self, connection: &ConnectionId, event: Event) -> bool {
        self.tx
            .send(Command::Event {
                connection: connection.clone(),
                event,
            })
            .is_ok()
    }

    /// Peers currently in a room, as of the next point between two events.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the coordinator task has exited.
    pub async fn lookup(&self, room: impl Into<String>) -> Result<Vec<PeerId>, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Lookup {
                room: room.into(),
                reply,
            })
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }

    /// Directory statistics.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Stopped`] if the coordinator task has exited.
    pub async fn stats(&self) -> Result<DirectoryStats, ServiceError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Stats { reply })
            .map_err(|_| ServiceError::Stopped)?;
        rx.await.map_err(|_| ServiceError::Stopped)
    }
}

/// Start the coordinator task.
///
/// The task runs until every [`CoordinatorHandle`] has been dropped.
pub fn spawn(
    coordinator: Coordinator,
    gateway: Arc<dyn Gateway>,
) -> (CoordinatorHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(coordinator, gateway, rx));
    (CoordinatorHandle { tx }, task)
}

async fn run(
    mut coordinator: Coordinator,
    gateway: Arc<dyn Gateway>,
    mut rx: mpsc::UnboundedReceiver<Command>,
) {
    info!("Coordinator started");

    while let Some(command) = rx.recv().await {
        match command {
            Command::Event { connection, event } => {
                let start = Instant::now();
                let kind = event.name();

                let outbound = coordinator.dispatch(&connection, event);
                let report = deliver(&outbound, gateway.as_ref());

                metrics::record_event(kind);
                for item in &outbound {
                    if let Notification::JoinRejected { reason, .. } = &item.notification {
                        metrics::record_rejection(reason.as_str());
                    }
                }
                metrics::record_delivery(report.queued, report.skipped);
                let stats = coordinator.stats();
                metrics::set_directory_size(stats.room_count, stats.member_count);
                metrics::record_dispatch_latency(start.elapsed().as_secs_f64());

                if report.skipped > 0 {
                    debug!(
                        connection = %connection,
                        event = kind,
                        skipped = report.skipped,
                        "Some recipients were already gone"
                    );
                }
            }
            Command::Lookup { room, reply } => {
                trace!(room = %room, "Lookup");
                let _ = reply.send(coordinator.lookup(&room));
            }
            Command::Stats { reply } => {
                let _ = reply.send(coordinator.stats());
            }
        }
    }

    info!("Coordinator stopped");
}

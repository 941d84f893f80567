//! Metrics collection and export for Rendezvous.
//!
//! Uses the `metrics` crate for instrumentation and exports
//! to Prometheus format.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Metric names.
pub mod names {
    pub const CONNECTIONS_TOTAL: &str = "rendezvous_connections_total";
    pub const CONNECTIONS_ACTIVE: &str = "rendezvous_connections_active";
    pub const FRAMES_TOTAL: &str = "rendezvous_frames_total";
    pub const FRAMES_BYTES: &str = "rendezvous_frames_bytes";
    pub const EVENTS_TOTAL: &str = "rendezvous_events_total";
    pub const JOIN_REJECTIONS_TOTAL: &str = "rendezvous_join_rejections_total";
    pub const NOTIFICATIONS_TOTAL: &str = "rendezvous_notifications_total";
    pub const UNDELIVERABLE_TOTAL: &str = "rendezvous_undeliverable_total";
    pub const ROOMS_ACTIVE: &str = "rendezvous_rooms_active";
    pub const MEMBERS_ACTIVE: &str = "rendezvous_members_active";
    pub const DISPATCH_SECONDS: &str = "rendezvous_dispatch_seconds";
    pub const ERRORS_TOTAL: &str = "rendezvous_errors_total";
}

/// Initialize the metrics system.
pub fn init_metrics() {
    metrics::describe_counter!(
        names::CONNECTIONS_TOTAL,
        "Total number of connections since server start"
    );
    metrics::describe_gauge!(
        names::CONNECTIONS_ACTIVE,
        "Current number of active connections"
    );
    metrics::describe_counter!(names::FRAMES_TOTAL, "Total number of frames processed");
    metrics::describe_counter!(names::FRAMES_BYTES, "Total bytes of frames processed");
    metrics::describe_counter!(names::EVENTS_TOTAL, "Coordinator events by kind");
    metrics::describe_counter!(
        names::JOIN_REJECTIONS_TOTAL,
        "Rejected join requests by reason"
    );
    metrics::describe_counter!(
        names::NOTIFICATIONS_TOTAL,
        "Membership notifications queued for clients"
    );
    metrics::describe_counter!(
        names::UNDELIVERABLE_TOTAL,
        "Notifications addressed to connections that were already gone"
    );
    metrics::describe_gauge!(names::ROOMS_ACTIVE, "Current number of rooms");
    metrics::describe_gauge!(names::MEMBERS_ACTIVE, "Current number of room members");
    metrics::describe_histogram!(
        names::DISPATCH_SECONDS,
        "Time spent applying one event, in seconds"
    );
    metrics::describe_counter!(names::ERRORS_TOTAL, "Total number of errors");

    info!("Metrics initialized");
}

/// Start the Prometheus metrics server.
///
/// # Errors
///
/// Returns an error if the server cannot be started.
pub fn start_metrics_server(port: u16) -> Result<(), Box<dyn std::error::Error>> {
    let addr: SocketAddr = format!("0.0.0.0:{}", port).parse()?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;

    info!("Metrics server listening on {}", addr);
    Ok(())
}

/// Record a new connection.
pub fn record_connection() {
    counter!(names::CONNECTIONS_TOTAL).increment(1);
    gauge!(names::CONNECTIONS_ACTIVE).increment(1.0);
}

/// Record a disconnection.
pub fn record_disconnection() {
    gauge!(names::CONNECTIONS_ACTIVE).decrement(1.0);
}

/// Record a frame.
pub fn record_frame(bytes: usize, direction: &'static str) {
    counter!(names::FRAMES_TOTAL, "direction" => direction).increment(1);
    counter!(names::FRAMES_BYTES, "direction" => direction).increment(bytes as u64);
}

/// Record a coordinator event.
pub fn record_event(kind: &'static str) {
    counter!(names::EVENTS_TOTAL, "kind" => kind).increment(1);
}

/// Record a rejected join.
pub fn record_rejection(reason: &'static str) {
    counter!(names::JOIN_REJECTIONS_TOTAL, "reason" => reason).increment(1);
}

/// Record queued and undeliverable notifications.
pub fn record_delivery(queued: usize, skipped: usize) {
    counter!(names::NOTIFICATIONS_TOTAL).increment(queued as u64);
    if skipped > 0 {
        counter!(names::UNDELIVERABLE_TOTAL).increment(skipped as u64);
    }
}

/// Update room and member gauges.
pub fn set_directory_size(rooms: usize, members: usize) {
    gauge!(names::ROOMS_ACTIVE).set(rooms as f64);
    gauge!(names::MEMBERS_ACTIVE).set(members as f64);
}

/// Record dispatch latency.
pub fn record_dispatch_latency(seconds: f64) {
    histogram!(names::DISPATCH_SECONDS).record(seconds);
}

/// Record an error.
pub fn record_error(error_type: &'static str) {
    counter!(names::ERRORS_TOTAL, "type" => error_type).increment(1);
}

/// Metrics guard that records disconnection on drop.
pub struct ConnectionMetricsGuard;

impl ConnectionMetricsGuard {
    /// Create a new metrics guard, recording a connection.
    #[must_use]
    pub fn new() -> Self {
        record_connection();
        Self
    }
}

impl Default for ConnectionMetricsGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ConnectionMetricsGuard {
    fn drop(&mut self) {
        record_disconnection();
    }
}

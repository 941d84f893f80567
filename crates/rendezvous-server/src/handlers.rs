//! Connection handlers for the Rendezvous server.
//!
//! This module owns the HTTP surface: the WebSocket gateway that feeds the
//! coordinator, plus a few diagnostic endpoints.

use crate::config::{Config, CorsConfig};
use crate::metrics::{self, ConnectionMetricsGuard};
use crate::service::{self, CoordinatorHandle};
use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::{HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use bytes::BytesMut;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rendezvous_core::{Coordinator, DirectoryConfig, Event, RoomDirectory};
use rendezvous_protocol::{codec, error_codes, Frame, Version, WireFormat, PROTOCOL_VERSION};
use rendezvous_transport::{ConnectionId, ConnectionRegistry, Registration};
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::{self, Instant};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Live connections.
    pub gateway: Arc<ConnectionRegistry>,
    /// Handle to the coordinator task.
    pub coordinator: CoordinatorHandle,
}

impl AppState {
    /// Create new app state and start the coordinator task.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let directory = RoomDirectory::with_config(DirectoryConfig {
            max_rooms: config.limits.max_rooms,
            max_members_per_room: config.limits.max_members_per_room,
        });
        let gateway = Arc::new(ConnectionRegistry::new(config.limits.max_connections));
        let (coordinator, _task) = service::spawn(Coordinator::new(directory), gateway.clone());

        Self {
            config,
            gateway,
            coordinator,
        }
    }
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let state = Arc::new(AppState::new(config));
    serve(listener, state, shutdown_signal()).await
}

/// Serve on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the configuration is invalid or serving fails.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    state.config.validate()?;
    let app = build_router(state.clone())?;

    let addr = listener.local_addr()?;
    info!("Rendezvous server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Rendezvous server stopped");
    Ok(())
}

/// Build the HTTP router.
///
/// # Errors
///
/// Returns an error if the CORS configuration is invalid.
pub fn build_router(state: Arc<AppState>) -> Result<Router> {
    let cors = cors_layer(&state.config.cors)?;

    Ok(Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/rooms/:name", get(room_handler))
        .route("/peer-registry", get(peer_registry_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Build the CORS layer from configuration.
fn cors_layer(config: &CorsConfig) -> Result<CorsLayer> {
    let methods = config
        .allowed_methods
        .iter()
        .map(|m| {
            m.parse::<Method>()
                .with_context(|| format!("Invalid CORS method: {}", m))
        })
        .collect::<Result<Vec<_>>>()?;

    let layer = CorsLayer::new().allow_methods(methods).allow_headers(Any);

    if config.allowed_origins.iter().any(|o| o == "*") {
        return Ok(layer.allow_origin(Any));
    }

    let origins = config
        .allowed_origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("Invalid CORS origin: {}", o))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(layer.allow_origin(origins))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.coordinator.stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "protocol": PROTOCOL_VERSION.to_string(),
                "rooms": stats.room_count,
                "members": stats.member_count,
                "connections": state.gateway.len(),
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "unavailable",
                "error": e.to_string(),
            })),
        ),
    }
}

/// Diagnostic roster of a room.
async fn room_handler(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    match state.coordinator.lookup(name.clone()).await {
        Ok(peers) => (
            StatusCode::OK,
            Json(serde_json::json!({ "room": name, "peers": peers })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": e.to_string() })),
        ),
    }
}

/// Where clients should register for a peer id.
async fn peer_registry_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.config.peer_registry.clone())
}

/// Query parameters on the WebSocket upgrade.
#[derive(Debug, Default, Deserialize)]
struct WsParams {
    /// Encoding for server frames until the client sends something.
    #[serde(default)]
    format: WireFormat,
    /// Protocol version the client speaks, `MAJOR.MINOR`.
    version: Option<String>,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    if let Some(requested) = params.version.as_deref() {
        if let Err(e) = Version::accept(requested) {
            warn!(error = %e, "Refusing upgrade");
            metrics::record_error("unsupported_version");
            return (StatusCode::BAD_REQUEST, e.to_string()).into_response();
        }
    }

    ws.max_message_size(state.config.limits.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, params.format))
        .into_response()
}

/// Handle a WebSocket connection.
async fn handle_websocket(mut socket: WebSocket, state: Arc<AppState>, format: WireFormat) {
    let mut registration = match state.gateway.register() {
        Ok(registration) => registration,
        Err(e) => {
            warn!(error = %e, "Rejecting connection");
            metrics::record_error("connection_limit");
            let _ = socket
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: e.to_string().into(),
                })))
                .await;
            return;
        }
    };

    let _metrics_guard = ConnectionMetricsGuard::new();
    let connection_id = registration.id().clone();

    debug!(connection = %connection_id, ?format, "WebSocket connected");

    if !state.coordinator.submit(&connection_id, Event::Connect) {
        error!(connection = %connection_id, "Coordinator is not running");
        return;
    }

    run_connection(socket, &state, &mut registration, format).await;

    // Exactly one disconnect per connection, after every event it sent.
    state.coordinator.submit(&connection_id, Event::Disconnect);
    drop(registration);

    debug!(connection = %connection_id, "WebSocket disconnected");
}

/// Pump frames between the socket, the coordinator and the outbound queue
/// until the connection ends.
async fn run_connection(
    socket: WebSocket,
    state: &AppState,
    registration: &mut Registration,
    mut format: WireFormat,
) {
    let connection_id = registration.id().clone();
    let heartbeat_interval = state.config.heartbeat.interval_ms;
    let timeout = Duration::from_millis(state.config.heartbeat.timeout_ms);

    let (mut sender, mut receiver) = socket.split();

    let connected = Frame::connected(
        connection_id.as_str(),
        PROTOCOL_VERSION.to_string(),
        u32::try_from(heartbeat_interval).unwrap_or(u32::MAX),
    );
    if let Err(e) = send_frame(&mut sender, &connected, format).await {
        error!(connection = %connection_id, error = %e, "Failed to send Connected frame");
        return;
    }

    // Read buffer for partial binary frames
    let mut read_buffer = BytesMut::with_capacity(4096);

    let period = Duration::from_millis(heartbeat_interval);
    let mut heartbeat = time::interval_at(Instant::now() + period, period);
    let mut last_seen = Instant::now();

    loop {
        tokio::select! {
            biased;

            // Notifications queued by the coordinator
            Some(frame) = registration.recv() => {
                if send_frame(&mut sender, &frame, format).await.is_err() {
                    break;
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() > timeout {
                    info!(connection = %connection_id, "Heartbeat timeout");
                    metrics::record_error("heartbeat_timeout");
                    break;
                }
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!(connection = %connection_id, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %connection_id, "WebSocket stream ended");
                        break;
                    }
                };
                last_seen = Instant::now();

                let result = match msg {
                    Message::Binary(data) => {
                        format = WireFormat::Msgpack;
                        metrics::record_frame(data.len(), "inbound");
                        read_buffer.extend_from_slice(&data);
                        handle_binary(&mut read_buffer, &connection_id, state, &mut sender).await
                    }
                    Message::Text(text) => {
                        format = WireFormat::Json;
                        metrics::record_frame(text.len(), "inbound");
                        handle_text(&text, &connection_id, state, &mut sender).await
                    }
                    Message::Ping(data) => sender
                        .send(Message::Pong(data))
                        .await
                        .map_err(anyhow::Error::from),
                    Message::Pong(_) => Ok(()),
                    Message::Close(_) => {
                        debug!(connection = %connection_id, "Received close frame");
                        break;
                    }
                };

                if let Err(e) = result {
                    debug!(connection = %connection_id, error = %e, "Closing connection");
                    break;
                }
            }
        }
    }
}

/// Decode and handle every complete frame in the read buffer.
///
/// A corrupt binary stream cannot be resynchronized, so decode errors are
/// reported to the client and end the connection.
async fn handle_binary(
    read_buffer: &mut BytesMut,
    connection_id: &ConnectionId,
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Result<()> {
    loop {
        match codec::decode_from(read_buffer) {
            Ok(Some(frame)) => {
                handle_frame(frame, connection_id, state, sender, WireFormat::Msgpack).await?;
            }
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(connection = %connection_id, error = %e, "Malformed binary frame");
                metrics::record_error("malformed_frame");
                let frame = Frame::error(error_codes::MALFORMED_FRAME, e.to_string());
                send_frame(sender, &frame, WireFormat::Msgpack).await?;
                return Err(e.into());
            }
        }
    }
}

/// Handle one JSON text frame. Malformed text is reported but not fatal.
async fn handle_text(
    text: &str,
    connection_id: &ConnectionId,
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
) -> Result<()> {
    match codec::decode_text(text) {
        Ok(frame) => handle_frame(frame, connection_id, state, sender, WireFormat::Json).await,
        Err(e) => {
            warn!(connection = %connection_id, error = %e, "Malformed text frame");
            metrics::record_error("malformed_frame");
            let frame = Frame::error(error_codes::MALFORMED_FRAME, e.to_string());
            send_frame(sender, &frame, WireFormat::Json).await
        }
    }
}

/// Handle a decoded frame.
async fn handle_frame(
    frame: Frame,
    connection_id: &ConnectionId,
    state: &AppState,
    sender: &mut SplitSink<WebSocket, Message>,
    format: WireFormat,
) -> Result<()> {
    if let Some(refusal) = refuse_server_frame(&frame) {
        warn!(
            connection = %connection_id,
            frame_type = ?frame.frame_type(),
            "Unexpected frame type"
        );
        return send_frame(sender, &refusal, format).await;
    }

    if let Some(event) = Event::from_frame(&frame) {
        debug!(connection = %connection_id, event = event.name(), "Room request");
        if !state.coordinator.submit(connection_id, event) {
            return Err(anyhow!("Coordinator is not running"));
        }
        return Ok(());
    }

    match frame {
        Frame::Ping { timestamp } => send_frame(sender, &Frame::pong(timestamp), format).await,
        _ => Ok(()),
    }
}

/// The error reply for a frame only the server may send, if it is one.
fn refuse_server_frame(frame: &Frame) -> Option<Frame> {
    if frame.is_client_frame() {
        return None;
    }
    Some(Frame::error(
        error_codes::UNEXPECTED_FRAME,
        format!("Clients may not send {:?} frames", frame.frame_type()),
    ))
}

/// Send a frame to the WebSocket in the connection's encoding.
async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &Frame,
    format: WireFormat,
) -> Result<()> {
    let message = match format {
        WireFormat::Msgpack => {
            let data = codec::encode(frame)?;
            metrics::record_frame(data.len(), "outbound");
            Message::Binary(data.to_vec())
        }
        WireFormat::Json => {
            let text = codec::encode_text(frame)?;
            metrics::record_frame(text.len(), "outbound");
            Message::Text(text)
        }
    };
    sender.send(message).await?;
    Ok(())
}

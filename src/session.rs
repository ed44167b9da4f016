//! Per-connection session handling
//!
//! Drives one connection through its lifecycle: WebSocket handshake with
//! token authentication, registration and room derivation, the message loop
//! with idle heartbeats, and teardown with presence-offline.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::connection::Connection;
use crate::emitter::EventEmitter;
use crate::error::GatewayError;
use crate::message::{ClientMessage, Envelope, EventKind, EventPayload, RoomMembersReply};
use crate::registry::ConnectionRegistry;
use crate::services::{IdentityResolver, MembershipDirectory};
use crate::types::{ProjectId, UserId};

/// Everything a session needs, shared across all connections
///
/// Built once at startup; the accept loop hands an `Arc` of it to every
/// handler. The registry and emitter are exposed so the surrounding
/// application can fan out domain events through the same instances.
pub struct Gateway {
    config: GatewayConfig,
    registry: Arc<ConnectionRegistry>,
    emitter: EventEmitter,
    identity: Arc<dyn IdentityResolver>,
    directory: Arc<dyn MembershipDirectory>,
}

impl Gateway {
    pub fn new(
        config: GatewayConfig,
        identity: Arc<dyn IdentityResolver>,
        directory: Arc<dyn MembershipDirectory>,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let emitter = EventEmitter::new(registry.clone());
        Self {
            config,
            registry,
            emitter,
            identity,
            directory,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn emitter(&self) -> &EventEmitter {
        &self.emitter
    }
}

/// Accept connections forever, one handler task per connection
pub async fn serve(gateway: Arc<Gateway>, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                debug!("Accepted connection from {}", addr);
                let gateway = gateway.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, gateway).await {
                        warn!("Connection handler ended with error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, authenticates the bearer token from
/// the query string, registers the connection and runs the message loop
/// until the peer goes away.
pub async fn handle_connection(
    stream: TcpStream,
    gateway: Arc<Gateway>,
) -> Result<(), GatewayError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    debug!("New TCP connection from {}", peer_addr);

    // WebSocket handshake, capturing the token from the request URI
    let mut token: Option<String> = None;
    let mut ws_stream =
        tokio_tungstenite::accept_hdr_async(stream, |request: &Request, response: Response| {
            token = bearer_token(request.uri().query());
            Ok(response)
        })
        .await?;

    // Resolve the credential before anything touches the registry
    let identity = match &token {
        Some(token) => gateway.identity.resolve(token).await,
        None => None,
    };
    let Some(identity) = identity else {
        let close = CloseFrame {
            code: CloseCode::Policy,
            reason: "authentication failed".into(),
        };
        let _ = ws_stream.close(Some(close)).await;
        return Err(GatewayError::AuthenticationFailed(peer_addr));
    };

    let user_id = identity.user_id;
    let username = identity.username;
    info!("User {} ({}) connected from {}", user_id, username, peer_addr);

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // Channel feeding this connection's write task
    let (envelope_tx, mut envelope_rx) = mpsc::unbounded_channel::<Envelope>();
    let connection = Connection::new(envelope_tx);
    let connection_id = connection.id;
    let opened_at = connection.opened_at;

    // Write task (Envelope -> WebSocket)
    let write_task = tokio::spawn(async move {
        while let Some(envelope) = envelope_rx.recv().await {
            match serde_json::to_string(&envelope) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("WebSocket send failed, ending write task");
                        break;
                    }
                }
                Err(e) => {
                    error!("Failed to serialize envelope: {}", e);
                    // Continue - don't break on serialization errors
                }
            }
        }
        debug!("Write task ended for connection");

        // Send close frame when done
        let _ = ws_sender.close().await;
    });

    // Register, then derive default rooms from the membership directory
    gateway.registry.register(connection.clone(), user_id).await;

    let project_ids = gateway.directory.project_ids(user_id).await;
    let workspace_ids = gateway.directory.workspace_ids(user_id).await;
    gateway.emitter.join_project_rooms(user_id, &project_ids).await;
    gateway
        .emitter
        .join_workspace_rooms(user_id, &workspace_ids)
        .await;
    gateway
        .emitter
        .emit_user_online(user_id, &username, &project_ids)
        .await;

    // Message loop: every inbound frame (or idle period) handled in turn
    let idle = gateway.config.idle_timeout;
    loop {
        match timeout(idle, ws_receiver.next()).await {
            Err(_) => {
                // Idle: probe liveness without disconnecting anyone
                debug!("Connection {} idle, sending heartbeat", connection_id);
                if connection.send(Envelope::heartbeat("ping")).is_err() {
                    debug!("Write task gone for {}, ending session", connection_id);
                    break;
                }
            }
            Ok(None) => {
                debug!("Stream ended for {}", connection_id);
                break;
            }
            Ok(Some(Err(e))) => {
                warn!("WebSocket error for {}: {}", connection_id, e);
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => {
                handle_client_message(&gateway, &connection, user_id, &username, &text).await;
            }
            Ok(Some(Ok(Message::Close(_)))) => {
                debug!("Connection {} sent close frame", connection_id);
                break;
            }
            Ok(Some(Ok(Message::Ping(_)))) => {
                // Pong is handled automatically by tungstenite
            }
            Ok(Some(Ok(_))) => {
                // Binary and pong frames are ignored
            }
        }
    }

    // Teardown: unregister, and when that was the user's last connection
    // announce them offline in the project rooms they just left
    if let Some(outcome) = gateway.registry.unregister(connection_id).await {
        if outcome.last_connection {
            let project_ids: Vec<ProjectId> = outcome
                .rooms
                .iter()
                .filter_map(|room| room.project_id())
                .collect();
            gateway
                .emitter
                .emit_user_offline(outcome.user_id, &username, &project_ids)
                .await;
        }
    }

    // Dropping our sender lets the write task drain and close the sink
    let elapsed = opened_at.elapsed();
    drop(connection);
    let _ = write_task.await;

    info!(
        "User {} connection {} closed after {:?}",
        user_id, connection_id, elapsed
    );

    Ok(())
}

/// Dispatch one parsed control frame
async fn handle_client_message(
    gateway: &Gateway,
    connection: &Connection,
    user_id: UserId,
    username: &str,
    text: &str,
) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            warn!("Invalid control message from user {}: {}", user_id, e);
            let _ = connection.send(Envelope::error(
                format!("invalid control message: {}", e),
                Some("invalid_message"),
            ));
            return;
        }
    };

    match message {
        ClientMessage::Heartbeat => {
            let _ = connection.send(Envelope::heartbeat("pong"));
        }
        ClientMessage::JoinRoom { room_id } => {
            if room_id.is_personal() {
                let _ = connection.send(Envelope::error(
                    "personal rooms are managed by the server",
                    Some("room_restricted"),
                ));
                return;
            }
            gateway.registry.join_room(user_id, room_id).await;
        }
        ClientMessage::LeaveRoom { room_id } => {
            if room_id.is_personal() {
                let _ = connection.send(Envelope::error(
                    "personal rooms are managed by the server",
                    Some("room_restricted"),
                ));
                return;
            }
            gateway.registry.leave_room(user_id, &room_id).await;
        }
        ClientMessage::Typing { project_id } => {
            gateway
                .emitter
                .emit_user_typing(user_id, username, project_id)
                .await;
        }
        ClientMessage::StopTyping { project_id } => {
            gateway
                .emitter
                .emit_user_stop_typing(user_id, username, project_id)
                .await;
        }
        ClientMessage::GetRoomMembers { room_id } => {
            let members = gateway.registry.room_members(&room_id).await;
            let reply = Envelope::new(
                EventKind::RoomMembers,
                EventPayload::Members(RoomMembersReply { members }),
            )
            .in_room(room_id);
            let _ = connection.send(reply);
        }
        ClientMessage::GetConnectionStats => {
            let stats = gateway.registry.stats().await;
            let reply = Envelope::new(EventKind::ConnectionStats, EventPayload::Stats(stats));
            let _ = connection.send(reply);
        }
    }
}

/// Extract the bearer token from a request query string
///
/// Accepts `?token=abc` with an optional `Bearer ` prefix, percent-encoded
/// or not.
fn bearer_token(query: Option<&str>) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            if key == "token" {
                let value = value
                    .strip_prefix("Bearer%20")
                    .or_else(|| value.strip_prefix("Bearer "))
                    .unwrap_or(value);
                if value.is_empty() {
                    return None;
                }
                return Some(value.to_string());
            }
        }
    }
    None
}

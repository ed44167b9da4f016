//! Integration tests over real WebSocket connections: handshake auth,
//! establishment frames, control messages, presence fan-out and teardown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use taskwire::{
    Gateway, GatewayConfig, Identity, ProjectId, RoomId, StaticDirectory, StaticTokens, TaskEvent,
    TaskId, UserId, WorkspaceId,
};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start a gateway on an ephemeral port and return its address and handle.
///
/// Three known users: alice (1, project 7 + workspace 3), bob (2,
/// project 7) and carol (3, no memberships).
async fn start_gateway(idle_timeout: Duration) -> (SocketAddr, Arc<Gateway>) {
    let mut tokens = StaticTokens::new();
    tokens.insert(
        "alice-token",
        Identity {
            user_id: UserId(1),
            username: "alice".to_string(),
        },
    );
    tokens.insert(
        "bob-token",
        Identity {
            user_id: UserId(2),
            username: "bob".to_string(),
        },
    );
    tokens.insert(
        "carol-token",
        Identity {
            user_id: UserId(3),
            username: "carol".to_string(),
        },
    );

    let mut directory = StaticDirectory::new();
    directory.add_project(UserId(1), ProjectId(7));
    directory.add_workspace(UserId(1), WorkspaceId(3));
    directory.add_project(UserId(2), ProjectId(7));

    let config = GatewayConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        idle_timeout,
    };
    let gateway = Arc::new(Gateway::new(config, Arc::new(tokens), Arc::new(directory)));

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local addr");
    tokio::spawn(taskwire::serve(gateway.clone(), listener));

    (addr, gateway)
}

async fn connect(addr: SocketAddr, token: &str) -> WsClient {
    let url = format!("ws://{}/ws?token={}", addr, token);
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Failed to connect");
    ws
}

/// Next text frame, parsed as JSON.
async fn recv_json(ws: &mut WsClient) -> Value {
    let msg = timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Timed out waiting for a frame")
        .expect("Stream ended unexpectedly")
        .expect("WebSocket error");
    match msg {
        Message::Text(text) => serde_json::from_str(&text).expect("Frame is not valid JSON"),
        other => panic!("Expected text frame, got: {:?}", other),
    }
}

/// Read frames until one with the given `type` arrives, skipping the rest.
async fn recv_kind(ws: &mut WsClient, kind: &str) -> Value {
    for _ in 0..25 {
        let v = recv_json(ws).await;
        if v["type"] == kind {
            return v;
        }
    }
    panic!("Never received a {} frame", kind);
}

/// Assert no frame arrives within the window.
async fn assert_silent(ws: &mut WsClient, window: Duration) {
    let result = timeout(window, ws.next()).await;
    assert!(result.is_err(), "Expected silence, got: {:?}", result);
}

/// Drain the frames a fresh connection receives: personal room ack,
/// connection_established and one room ack per membership.
async fn drain_establishment(ws: &mut WsClient, memberships: usize) {
    for _ in 0..(2 + memberships) {
        recv_json(ws).await;
    }
}

#[tokio::test]
async fn test_connect_receives_establishment_frames_in_order() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut ws = connect(addr, "alice-token").await;

    let first = recv_json(&mut ws).await;
    assert_eq!(first["type"], "room_joined");
    assert_eq!(first["room_id"], "user:1");

    let second = recv_json(&mut ws).await;
    assert_eq!(second["type"], "connection_established");
    assert_eq!(second["user_id"], 1);
    assert_eq!(second["data"]["message"], "connection established");
    assert!(second.get("room_id").is_none());
    assert!(second["timestamp"].is_string());

    // Membership rooms follow, projects before workspaces
    let third = recv_json(&mut ws).await;
    assert_eq!(third["type"], "room_joined");
    assert_eq!(third["room_id"], "project:7");

    let fourth = recv_json(&mut ws).await;
    assert_eq!(fourth["type"], "room_joined");
    assert_eq!(fourth["room_id"], "workspace:3");

    assert!(gateway.registry().is_online(UserId(1)).await);
    let rooms = gateway.registry().user_rooms(UserId(1)).await;
    assert_eq!(rooms.len(), 3);
}

#[tokio::test]
async fn test_invalid_token_is_closed_with_policy_code() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;

    let url = format!("ws://{}/ws?token=wrong", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Upgrade should succeed even with a bad token");

    let msg = timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected a close frame within timeout")
        .expect("Stream ended without a close frame")
        .expect("WebSocket error");
    match msg {
        Message::Close(Some(frame)) => {
            assert_eq!(frame.code, CloseCode::Policy);
            assert_eq!(frame.reason, "authentication failed");
        }
        other => panic!("Expected close frame, got: {:?}", other),
    }

    assert_eq!(gateway.registry().stats().await.total_connections, 0);
}

#[tokio::test]
async fn test_missing_token_is_refused() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;

    let url = format!("ws://{}/ws", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("Upgrade should succeed without a token");

    let msg = timeout(Duration::from_secs(2), ws.next())
        .await
        .expect("Expected a close frame within timeout")
        .expect("Stream ended without a close frame")
        .expect("WebSocket error");
    assert!(msg.is_close(), "Expected close frame, got: {:?}", msg);
    assert_eq!(gateway.registry().stats().await.total_connections, 0);
}

#[tokio::test]
async fn test_heartbeat_is_answered_with_pong() {
    let (addr, _gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut ws = connect(addr, "carol-token").await;
    drain_establishment(&mut ws, 0).await;

    ws.send(Message::Text(r#"{"type": "heartbeat"}"#.into()))
        .await
        .expect("Failed to send heartbeat");

    let v = recv_json(&mut ws).await;
    assert_eq!(v["type"], "heartbeat");
    assert_eq!(v["data"]["message"], "pong");
}

#[tokio::test]
async fn test_idle_connection_receives_heartbeat_ping() {
    let (addr, _gateway) = start_gateway(Duration::from_millis(200)).await;
    let mut ws = connect(addr, "carol-token").await;
    drain_establishment(&mut ws, 0).await;

    // Send nothing; the server probes idle connections instead of
    // disconnecting them
    let v = recv_kind(&mut ws, "heartbeat").await;
    assert_eq!(v["data"]["message"], "ping");

    // Still alive afterwards; further pings may race the pong
    ws.send(Message::Text(r#"{"type": "heartbeat"}"#.into()))
        .await
        .expect("Failed to send heartbeat");
    let mut saw_pong = false;
    for _ in 0..10 {
        let v = recv_json(&mut ws).await;
        if v["type"] == "heartbeat" && v["data"]["message"] == "pong" {
            saw_pong = true;
            break;
        }
    }
    assert!(saw_pong, "Never received the heartbeat pong");
}

#[tokio::test]
async fn test_join_and_leave_room_via_control_messages() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut ws = connect(addr, "carol-token").await;
    drain_establishment(&mut ws, 0).await;

    ws.send(Message::Text(
        r#"{"type": "join_room", "room_id": "task:5"}"#.into(),
    ))
    .await
    .expect("Failed to send join_room");
    let v = recv_kind(&mut ws, "room_joined").await;
    assert_eq!(v["room_id"], "task:5");
    assert_eq!(v["data"]["message"], "joined room task:5");
    assert_eq!(
        gateway
            .registry()
            .room_members(&RoomId::task(TaskId(5)))
            .await,
        vec![UserId(3)]
    );

    ws.send(Message::Text(
        r#"{"type": "leave_room", "room_id": "task:5"}"#.into(),
    ))
    .await
    .expect("Failed to send leave_room");
    let v = recv_kind(&mut ws, "room_left").await;
    assert_eq!(v["room_id"], "task:5");
    assert!(gateway
        .registry()
        .room_members(&RoomId::task(TaskId(5)))
        .await
        .is_empty());
}

#[tokio::test]
async fn test_personal_rooms_cannot_be_joined_or_left() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut ws = connect(addr, "carol-token").await;
    drain_establishment(&mut ws, 0).await;

    ws.send(Message::Text(
        r#"{"type": "join_room", "room_id": "user:9"}"#.into(),
    ))
    .await
    .expect("Failed to send join_room");
    let v = recv_kind(&mut ws, "error").await;
    assert_eq!(v["data"]["error_code"], "room_restricted");

    ws.send(Message::Text(
        r#"{"type": "leave_room", "room_id": "user:3"}"#.into(),
    ))
    .await
    .expect("Failed to send leave_room");
    let v = recv_kind(&mut ws, "error").await;
    assert_eq!(v["data"]["error_code"], "room_restricted");

    // Carol still sits in her own personal room
    let rooms = gateway.registry().user_rooms(UserId(3)).await;
    assert_eq!(rooms, vec![RoomId::user(UserId(3))]);
}

#[tokio::test]
async fn test_malformed_frame_gets_error_and_session_survives() {
    let (addr, _gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut ws = connect(addr, "carol-token").await;
    drain_establishment(&mut ws, 0).await;

    ws.send(Message::Text("this is not json".into()))
        .await
        .expect("Failed to send garbage");
    let v = recv_kind(&mut ws, "error").await;
    assert_eq!(v["data"]["error_code"], "invalid_message");

    // Unknown control types are rejected the same way
    ws.send(Message::Text(r#"{"type": "shutdown"}"#.into()))
        .await
        .expect("Failed to send unknown control");
    let v = recv_kind(&mut ws, "error").await;
    assert_eq!(v["data"]["error_code"], "invalid_message");

    // The session keeps serving after both errors
    ws.send(Message::Text(r#"{"type": "heartbeat"}"#.into()))
        .await
        .expect("Failed to send heartbeat");
    let v = recv_kind(&mut ws, "heartbeat").await;
    assert_eq!(v["data"]["message"], "pong");
}

#[tokio::test]
async fn test_room_members_and_stats_queries() {
    let (addr, _gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut alice = connect(addr, "alice-token").await;
    drain_establishment(&mut alice, 2).await;
    let mut bob = connect(addr, "bob-token").await;
    drain_establishment(&mut bob, 1).await;

    // Alice sees bob come online in project 7 first
    let v = recv_kind(&mut alice, "user_online").await;
    assert_eq!(v["data"]["username"], "bob");

    alice
        .send(Message::Text(
            r#"{"type": "get_room_members", "room_id": "project:7"}"#.into(),
        ))
        .await
        .expect("Failed to send get_room_members");
    let v = recv_kind(&mut alice, "room_members").await;
    assert_eq!(v["room_id"], "project:7");
    assert_eq!(v["data"]["members"], json!([1, 2]));

    alice
        .send(Message::Text(r#"{"type": "get_connection_stats"}"#.into()))
        .await
        .expect("Failed to send get_connection_stats");
    let v = recv_kind(&mut alice, "connection_stats").await;
    assert_eq!(v["data"]["total_users"], 2);
    assert_eq!(v["data"]["total_connections"], 2);
    assert_eq!(v["data"]["online_users"], json!([1, 2]));
}

#[tokio::test]
async fn test_typing_fans_out_to_project_peers_only() {
    let (addr, _gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut alice = connect(addr, "alice-token").await;
    drain_establishment(&mut alice, 2).await;
    let mut bob = connect(addr, "bob-token").await;
    drain_establishment(&mut bob, 1).await;

    bob.send(Message::Text(
        r#"{"type": "typing", "project_id": 7}"#.into(),
    ))
    .await
    .expect("Failed to send typing");

    let v = recv_kind(&mut alice, "user_typing").await;
    assert_eq!(v["room_id"], "project:7");
    assert_eq!(v["user_id"], 2);
    assert_eq!(v["data"]["username"], "bob");
    assert_eq!(v["data"]["status"], "typing");
    assert_eq!(v["data"]["project_id"], 7);

    bob.send(Message::Text(
        r#"{"type": "stop_typing", "project_id": 7}"#.into(),
    ))
    .await
    .expect("Failed to send stop_typing");
    let v = recv_kind(&mut alice, "user_stop_typing").await;
    assert_eq!(v["data"]["status"], "stop_typing");

    // The typist never hears their own typing events
    assert_silent(&mut bob, Duration::from_millis(300)).await;
}

#[tokio::test]
async fn test_offline_presence_fires_on_last_disconnect_only() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut bob = connect(addr, "bob-token").await;
    drain_establishment(&mut bob, 1).await;

    let mut tab1 = connect(addr, "alice-token").await;
    drain_establishment(&mut tab1, 2).await;
    let v = recv_kind(&mut bob, "user_online").await;
    assert_eq!(v["data"]["username"], "alice");

    let mut tab2 = connect(addr, "alice-token").await;
    drain_establishment(&mut tab2, 2).await;
    // Every new tab re-announces presence to the project peers
    recv_kind(&mut bob, "user_online").await;

    // First tab closing: alice stays online through the second
    tab1.close(None).await.expect("Failed to close tab 1");
    assert_silent(&mut bob, Duration::from_millis(300)).await;
    assert!(gateway.registry().is_online(UserId(1)).await);

    tab2.close(None).await.expect("Failed to close tab 2");
    let v = recv_kind(&mut bob, "user_offline").await;
    assert_eq!(v["user_id"], 1);
    assert_eq!(v["data"]["status"], "offline");

    // Registry dropped every trace of the user
    assert!(!gateway.registry().is_online(UserId(1)).await);
}

#[tokio::test]
async fn test_emitted_task_event_reaches_project_sockets() {
    let (addr, gateway) = start_gateway(Duration::from_secs(30)).await;
    let mut alice = connect(addr, "alice-token").await;
    drain_establishment(&mut alice, 2).await;
    let mut bob = connect(addr, "bob-token").await;
    drain_establishment(&mut bob, 1).await;

    gateway
        .emitter()
        .emit_task_created(TaskEvent {
            task_id: TaskId(42),
            project_id: ProjectId(7),
            title: "Ship the beta".to_string(),
            created_by: Some(UserId(1)),
            created_by_name: Some("alice".to_string()),
            assignee_id: Some(UserId(2)),
            assignee_name: Some("bob".to_string()),
            ..Default::default()
        })
        .await;

    let v = recv_kind(&mut alice, "task_created").await;
    assert_eq!(v["room_id"], "project:7");
    assert_eq!(v["data"]["task_id"], 42);
    assert_eq!(v["data"]["title"], "Ship the beta");

    // The assignee additionally gets the personal alert
    let v = recv_kind(&mut bob, "task_created").await;
    assert_eq!(v["room_id"], "project:7");
    let v = recv_kind(&mut bob, "task_assigned").await;
    assert_eq!(v["room_id"], "user:2");
    assert_eq!(v["user_id"], 2);
    assert_eq!(v["data"]["assignee_id"], 2);
}

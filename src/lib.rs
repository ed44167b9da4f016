//! Real-time WebSocket Notification Gateway
//!
//! Fan-out core for a collaborative task-management backend, built with
//! tokio-tungstenite. Whenever project, task, comment or membership data
//! changes, this crate decides who should hear about it right now and
//! pushes a typed JSON envelope to their live connections.
//!
//! # Features
//! - Token-authenticated WebSocket connections (multiple per user)
//! - Room-based fan-out: `user:*`, `project:*`, `workspace:*`, `task:*`
//! - Typed event envelopes with a closed tag vocabulary
//! - Delivery policies per event: room broadcast, personal copies,
//!   mention alerts, actor exclusion
//! - Presence (online/offline/typing) derived from connection lifecycle
//! - Idle heartbeats, self-healing removal of dead connections
//!
//! # Architecture
//! All shared state lives in one `ConnectionRegistry` behind a single
//! `RwLock`:
//! - Each connection runs a session task plus a write task owning the
//!   socket sink; deliveries flow through an unbounded per-connection
//!   channel
//! - The `EventEmitter` turns domain facts into concrete deliveries
//! - Identity, membership and durable notifications come in through trait
//!   seams so the gateway stays storage-free
//!
//! # Example
//! ```ignore
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use taskwire::{serve, Gateway, GatewayConfig, StaticDirectory, StaticTokens};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = GatewayConfig::from_env();
//!     let listener = TcpListener::bind(&config.bind_addr).await.unwrap();
//!     let gateway = Arc::new(Gateway::new(
//!         config,
//!         Arc::new(StaticTokens::new()),
//!         Arc::new(StaticDirectory::new()),
//!     ));
//!
//!     // Domain code emits through gateway.emitter() while this runs
//!     serve(gateway, listener).await;
//! }
//! ```

pub mod config;
pub mod connection;
pub mod emitter;
pub mod error;
pub mod message;
pub mod registry;
pub mod services;
pub mod session;
pub mod types;

// Re-export main types for convenience
pub use config::GatewayConfig;
pub use connection::Connection;
pub use emitter::EventEmitter;
pub use error::{GatewayError, SendError};
pub use message::{
    ClientMessage, CommentEvent, Envelope, EventKind, EventPayload, NotificationEvent,
    PresenceEvent, PresenceStatus, ProjectEvent, TaskEvent,
};
pub use registry::{ConnectionRegistry, RegistryStats, UnregisterOutcome};
pub use services::{
    Identity, IdentityResolver, MembershipDirectory, MemoryRecorder, NotificationRecorder,
    StaticDirectory, StaticTokens,
};
pub use session::{handle_connection, serve, Gateway};
pub use types::{ConnectionId, ProjectId, RoomId, RoomKind, TaskId, UserId, WorkspaceId};

//! Error types for the gateway
//!
//! Defines fatal per-connection errors and message send errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Fatal per-connection errors
///
/// Anything surfacing as a `GatewayError` terminates the connection it
/// occurred on. Recoverable conditions (malformed control frames, failed
/// deliveries to individual recipients) never reach this type: they are
/// answered with an `error` envelope or absorbed inside the registry.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// WebSocket protocol error (fatal)
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Bearer credential missing or rejected by the identity resolver.
    /// The connection is closed with a policy-violation code before it
    /// ever becomes active.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Message send errors
///
/// Occurs when pushing an envelope into a connection whose write task has
/// already gone away. The registry treats this as "connection is dead" and
/// removes the connection; the error never propagates further.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SendError {
    /// The receiving end of the connection channel has been closed
    #[error("connection channel closed")]
    Closed,
}

//! Connection struct definition
//!
//! Represents one live client connection: its identity and the channel
//! feeding its dedicated write task.

use std::time::Instant;

use tokio::sync::mpsc;

use crate::error::SendError;
use crate::message::Envelope;
use crate::types::ConnectionId;

/// One live WebSocket connection
///
/// A user with several tabs or devices owns several of these. The sender is
/// unbounded: a failed send therefore means the write task is gone, which
/// the registry takes as the signal to drop the connection.
#[derive(Debug, Clone)]
pub struct Connection {
    /// Unique identifier for this connection
    pub id: ConnectionId,
    /// Registry → write task envelope channel
    sender: mpsc::UnboundedSender<Envelope>,
    /// When the connection became active, logged at teardown
    pub opened_at: Instant,
}

impl Connection {
    /// Create a new connection with a fresh random id
    pub fn new(sender: mpsc::UnboundedSender<Envelope>) -> Self {
        Self {
            id: ConnectionId::new(),
            sender,
            opened_at: Instant::now(),
        }
    }

    /// Queue an envelope for this connection
    ///
    /// Returns an error if the write task has terminated.
    pub fn send(&self, envelope: Envelope) -> Result<(), SendError> {
        self.sender.send(envelope).map_err(|_| SendError::Closed)
    }

    /// Check whether the write task is still draining the channel
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

//! ConnectionRegistry implementation
//!
//! The single shared state holder: which users are connected, through which
//! connections, and which rooms they belong to. All four indices live behind
//! one RwLock so every operation mutates them as one atomic unit.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::connection::Connection;
use crate::error::SendError;
use crate::message::{Envelope, EventKind};
use crate::types::{ConnectionId, RoomId, UserId};

/// Registry-wide counters, answered to `get_connection_stats`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_users: usize,
    pub total_connections: usize,
    pub total_rooms: usize,
    pub online_users: Vec<UserId>,
}

/// What `unregister` found out while removing a connection.
///
/// `rooms` is only populated when the removed connection was the user's
/// last one; the session uses it to broadcast presence-offline to the
/// project rooms the user just vanished from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnregisterOutcome {
    pub user_id: UserId,
    pub last_connection: bool,
    pub rooms: Vec<RoomId>,
}

/// The four membership indices, mutated only under the registry's lock.
#[derive(Default)]
struct RegistryInner {
    /// Live connections per user: UserId -> connections (≥1 entry each)
    connections: HashMap<UserId, Vec<Connection>>,
    /// Room members: RoomId -> user ids (≥1 entry each)
    rooms: HashMap<RoomId, HashSet<UserId>>,
    /// Reverse of `rooms`: UserId -> rooms the user is in
    user_rooms: HashMap<UserId, HashSet<RoomId>>,
    /// Connection ownership: ConnectionId -> UserId
    connection_users: HashMap<ConnectionId, UserId>,
}

/// The shared connection and room-membership registry
///
/// One instance lives for the whole process. Sessions register and
/// unregister connections; the emitter fans events out through it. Write
/// operations take the write guard for their entire body, so concurrent
/// joins, leaves and disconnects never interleave half-done.
#[derive(Default)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
}

impl ConnectionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for an authenticated user
    ///
    /// Auto-joins the user's personal room and acknowledges with a
    /// `connection_established` envelope on the new connection only.
    /// Registering an already-known connection id is a no-op.
    pub async fn register(&self, connection: Connection, user_id: UserId) {
        let mut inner = self.inner.write().await;

        if inner.connection_users.contains_key(&connection.id) {
            debug!("Connection {} already registered", connection.id);
            return;
        }

        inner.connection_users.insert(connection.id, user_id);
        inner
            .connections
            .entry(user_id)
            .or_default()
            .push(connection.clone());

        // Every user sits in their personal room for direct deliveries
        Self::join_room_locked(&mut inner, user_id, RoomId::user(user_id));

        // The ack goes to the new connection only, not the user's other tabs
        let ack = Envelope::note(EventKind::ConnectionEstablished, "connection established")
            .for_user(user_id);
        if connection.send(ack).is_err() {
            warn!(
                "Connection {} closed before the registration ack",
                connection.id
            );
        }

        info!(
            "User {} connected via {} ({} connection(s))",
            user_id,
            connection.id,
            inner.connections.get(&user_id).map_or(0, Vec::len)
        );
    }

    /// Remove a connection
    ///
    /// When it was the user's last connection, the user is batch-removed
    /// from every room and the returned outcome carries the room snapshot.
    /// Unknown connection ids return `None`.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<UnregisterOutcome> {
        let mut inner = self.inner.write().await;
        let outcome = Self::remove_connection_locked(&mut inner, connection_id);
        if outcome.is_none() {
            debug!("Unregister for unknown connection {}", connection_id);
        }
        outcome
    }

    /// Deliver an envelope to every live connection of one user
    ///
    /// Returns how many connections received it; 0 when the user is
    /// offline. Connections whose write task has died are dropped in
    /// passing without aborting the remaining deliveries.
    pub async fn send_to_user(&self, user_id: UserId, envelope: Envelope) -> usize {
        let mut inner = self.inner.write().await;
        Self::send_to_user_locked(&mut inner, user_id, &envelope)
    }

    /// Broadcast an envelope to every member of a room
    ///
    /// The member set is snapshotted before iterating, the envelope is
    /// stamped with the room id, and `exclude` (typically the acting user)
    /// is skipped. Returns the total count of connections reached; unknown
    /// rooms count as 0 and are not an error.
    pub async fn broadcast_to_room(
        &self,
        room: &RoomId,
        envelope: Envelope,
        exclude: Option<UserId>,
    ) -> usize {
        let mut inner = self.inner.write().await;

        // Snapshot first: dead-connection cleanup during the fan-out may
        // mutate the room index under us
        let Some(members) = inner.rooms.get(room) else {
            debug!("Broadcast {} to unknown room {}", envelope.kind, room);
            return 0;
        };
        let mut members: Vec<UserId> = members.iter().copied().collect();
        members.sort();

        let envelope = envelope.in_room(room.clone());

        let mut delivered = 0;
        for member in members {
            if Some(member) == exclude {
                continue;
            }
            delivered += Self::send_to_user_locked(&mut inner, member, &envelope);
        }

        debug!(
            "Broadcast {} to room {}: {} connection(s) reached",
            envelope.kind, room, delivered
        );
        delivered
    }

    /// Add a user to a room and ack with `room_joined`
    pub async fn join_room(&self, user_id: UserId, room: RoomId) {
        let mut inner = self.inner.write().await;
        Self::join_room_locked(&mut inner, user_id, room);
    }

    /// Remove a user from a room and ack with `room_left`
    pub async fn leave_room(&self, user_id: UserId, room: &RoomId) {
        let mut inner = self.inner.write().await;
        Self::leave_room_locked(&mut inner, user_id, room);
    }

    /// Whether the user has at least one live connection
    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.inner.read().await.connections.contains_key(&user_id)
    }

    /// All currently connected users, sorted
    pub async fn online_users(&self) -> Vec<UserId> {
        let inner = self.inner.read().await;
        let mut users: Vec<UserId> = inner.connections.keys().copied().collect();
        users.sort();
        users
    }

    /// Current members of a room, sorted; empty for unknown rooms
    pub async fn room_members(&self, room: &RoomId) -> Vec<UserId> {
        let inner = self.inner.read().await;
        let mut members: Vec<UserId> = inner
            .rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    /// Rooms a user currently belongs to, sorted
    pub async fn user_rooms(&self, user_id: UserId) -> Vec<RoomId> {
        let inner = self.inner.read().await;
        let mut rooms: Vec<RoomId> = inner
            .user_rooms
            .get(&user_id)
            .map(|r| r.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    /// Registry-wide counters
    pub async fn stats(&self) -> RegistryStats {
        let inner = self.inner.read().await;
        let mut online_users: Vec<UserId> = inner.connections.keys().copied().collect();
        online_users.sort();
        RegistryStats {
            total_users: inner.connections.len(),
            total_connections: inner.connections.values().map(Vec::len).sum(),
            total_rooms: inner.rooms.len(),
            online_users,
        }
    }

    /// Deliver to one user's connections, reaping dead ones in passing
    fn send_to_user_locked(
        inner: &mut RegistryInner,
        user_id: UserId,
        envelope: &Envelope,
    ) -> usize {
        let Some(conns) = inner.connections.get(&user_id) else {
            debug!("User {} is offline, dropping {}", user_id, envelope.kind);
            return 0;
        };

        let mut delivered = 0;
        let mut dead = Vec::new();
        for conn in conns {
            match conn.send(envelope.clone()) {
                Ok(()) => delivered += 1,
                Err(SendError::Closed) => dead.push(conn.id),
            }
        }

        // A failed send means the write task is gone
        for connection_id in dead {
            warn!(
                "Dropping dead connection {} of user {}",
                connection_id, user_id
            );
            Self::remove_connection_locked(inner, connection_id);
        }

        delivered
    }

    fn join_room_locked(inner: &mut RegistryInner, user_id: UserId, room: RoomId) {
        inner.rooms.entry(room.clone()).or_default().insert(user_id);
        inner
            .user_rooms
            .entry(user_id)
            .or_default()
            .insert(room.clone());

        info!("User {} joined room {}", user_id, room);

        let ack = Envelope::note(EventKind::RoomJoined, format!("joined room {}", room))
            .in_room(room);
        Self::send_to_user_locked(inner, user_id, &ack);
    }

    fn leave_room_locked(inner: &mut RegistryInner, user_id: UserId, room: &RoomId) {
        if let Some(members) = inner.rooms.get_mut(room) {
            members.remove(&user_id);
            if members.is_empty() {
                inner.rooms.remove(room);
                debug!("Room {} deleted (empty)", room);
            }
        }
        if let Some(rooms) = inner.user_rooms.get_mut(&user_id) {
            rooms.remove(room);
            if rooms.is_empty() {
                inner.user_rooms.remove(&user_id);
            }
        }

        info!("User {} left room {}", user_id, room);

        let ack = Envelope::note(EventKind::RoomLeft, format!("left room {}", room))
            .in_room(room.clone());
        Self::send_to_user_locked(inner, user_id, &ack);
    }

    fn remove_connection_locked(
        inner: &mut RegistryInner,
        connection_id: ConnectionId,
    ) -> Option<UnregisterOutcome> {
        let user_id = inner.connection_users.remove(&connection_id)?;

        let last_connection = match inner.connections.get_mut(&user_id) {
            Some(conns) => {
                conns.retain(|c| c.id != connection_id);
                conns.is_empty()
            }
            None => {
                warn!(
                    "Connection index missing user {} while removing {}",
                    user_id, connection_id
                );
                true
            }
        };

        let rooms = if last_connection {
            inner.connections.remove(&user_id);
            Self::leave_all_rooms_locked(inner, user_id)
        } else {
            Vec::new()
        };

        info!(
            "User {} connection {} removed (last: {})",
            user_id, connection_id, last_connection
        );

        Some(UnregisterOutcome {
            user_id,
            last_connection,
            rooms,
        })
    }

    /// Batch-leave every room of a user whose last connection is gone.
    /// No `room_left` acks here, there is nothing left to deliver them to.
    fn leave_all_rooms_locked(inner: &mut RegistryInner, user_id: UserId) -> Vec<RoomId> {
        let Some(rooms) = inner.user_rooms.remove(&user_id) else {
            return Vec::new();
        };

        let mut rooms: Vec<RoomId> = rooms.into_iter().collect();
        rooms.sort();
        for room in &rooms {
            match inner.rooms.get_mut(room) {
                Some(members) => {
                    members.remove(&user_id);
                    if members.is_empty() {
                        inner.rooms.remove(room);
                        debug!("Room {} deleted (empty)", room);
                    }
                }
                None => warn!(
                    "Room index missing {} while removing user {}",
                    room, user_id
                ),
            }
        }

        debug!("User {} left {} room(s)", user_id, rooms.len());
        rooms
    }
}

//! Message protocol definitions
//!
//! JSON-based bidirectional protocol using Serde's tagged enums for
//! type-safe serialization/deserialization. Outbound traffic is the
//! `Envelope` (`{type, timestamp, room_id?, user_id?, data}`); inbound
//! traffic is the small `ClientMessage` control vocabulary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::RegistryStats;
use crate::types::{ProjectId, RoomId, TaskId, UserId, WorkspaceId};

/// Event tag carried in the envelope `type` field.
///
/// Closed vocabulary, serialized snake_case. Adding a tag here is the only
/// way to put a new event on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    // System
    ConnectionEstablished,
    RoomJoined,
    RoomLeft,
    Error,
    Heartbeat,
    RoomMembers,
    ConnectionStats,
    // Notifications
    NotificationNew,
    NotificationRead,
    NotificationDeleted,
    // Tasks
    TaskCreated,
    TaskUpdated,
    TaskDeleted,
    TaskStatusChanged,
    TaskAssigned,
    // Comments
    CommentCreated,
    CommentUpdated,
    CommentDeleted,
    CommentMention,
    // Projects
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    ProjectMemberAdded,
    ProjectMemberRemoved,
    ProjectMemberRoleChanged,
    ProjectInvitationSent,
    // Workspaces
    WorkspaceCreated,
    WorkspaceUpdated,
    WorkspaceDeleted,
    WorkspaceOrderChanged,
    // Presence
    UserOnline,
    UserOffline,
    UserTyping,
    UserStopTyping,
}

impl EventKind {
    /// Wire name of the tag, for log output.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ConnectionEstablished => "connection_established",
            EventKind::RoomJoined => "room_joined",
            EventKind::RoomLeft => "room_left",
            EventKind::Error => "error",
            EventKind::Heartbeat => "heartbeat",
            EventKind::RoomMembers => "room_members",
            EventKind::ConnectionStats => "connection_stats",
            EventKind::NotificationNew => "notification_new",
            EventKind::NotificationRead => "notification_read",
            EventKind::NotificationDeleted => "notification_deleted",
            EventKind::TaskCreated => "task_created",
            EventKind::TaskUpdated => "task_updated",
            EventKind::TaskDeleted => "task_deleted",
            EventKind::TaskStatusChanged => "task_status_changed",
            EventKind::TaskAssigned => "task_assigned",
            EventKind::CommentCreated => "comment_created",
            EventKind::CommentUpdated => "comment_updated",
            EventKind::CommentDeleted => "comment_deleted",
            EventKind::CommentMention => "comment_mention",
            EventKind::ProjectCreated => "project_created",
            EventKind::ProjectUpdated => "project_updated",
            EventKind::ProjectDeleted => "project_deleted",
            EventKind::ProjectMemberAdded => "project_member_added",
            EventKind::ProjectMemberRemoved => "project_member_removed",
            EventKind::ProjectMemberRoleChanged => "project_member_role_changed",
            EventKind::ProjectInvitationSent => "project_invitation_sent",
            EventKind::WorkspaceCreated => "workspace_created",
            EventKind::WorkspaceUpdated => "workspace_updated",
            EventKind::WorkspaceDeleted => "workspace_deleted",
            EventKind::WorkspaceOrderChanged => "workspace_order_changed",
            EventKind::UserOnline => "user_online",
            EventKind::UserOffline => "user_offline",
            EventKind::UserTyping => "user_typing",
            EventKind::UserStopTyping => "user_stop_typing",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server → Client message
///
/// The single outbound wire shape. `room_id` and `user_id` are addressing
/// hints and are omitted entirely when absent, never serialized as null.
/// Envelopes are immutable once built; the registry stamps `room_id`
/// during a broadcast by constructing the final value before fan-out.
#[derive(Debug, Clone, Serialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_id: Option<RoomId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    pub data: EventPayload,
}

impl Envelope {
    /// Build an envelope stamped with the current time and no addressing.
    pub fn new(kind: EventKind, data: EventPayload) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            room_id: None,
            user_id: None,
            data,
        }
    }

    /// Set the room addressing hint.
    pub fn in_room(mut self, room: RoomId) -> Self {
        self.room_id = Some(room);
        self
    }

    /// Set the user addressing hint. Accepts `UserId` or `Option<UserId>`.
    pub fn for_user<U: Into<Option<UserId>>>(mut self, user: U) -> Self {
        self.user_id = user.into();
        self
    }

    /// System note envelope (connection/room acknowledgements).
    pub fn note(kind: EventKind, message: impl Into<String>) -> Self {
        Self::new(
            kind,
            EventPayload::Note(SystemNote {
                message: message.into(),
            }),
        )
    }

    /// Heartbeat envelope carrying "ping" or "pong".
    pub fn heartbeat(message: &str) -> Self {
        Self::note(EventKind::Heartbeat, message)
    }

    /// Error envelope answered on the connection that caused it.
    pub fn error(message: impl Into<String>, error_code: Option<&str>) -> Self {
        Self::new(
            EventKind::Error,
            EventPayload::Error(ErrorReply {
                message: message.into(),
                error_code: error_code.map(str::to_string),
            }),
        )
    }
}

/// Envelope payload, one variant per event family.
///
/// Serialized untagged: the envelope `type` already discriminates, so the
/// payload contributes only its fields.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum EventPayload {
    Task(TaskEvent),
    Comment(CommentEvent),
    Project(ProjectEvent),
    Notification(NotificationEvent),
    Presence(PresenceEvent),
    Members(RoomMembersReply),
    Stats(RegistryStats),
    Error(ErrorReply),
    Note(SystemNote),
}

/// Task event payload (created/updated/deleted/status-changed/assigned).
///
/// `old_status`/`new_status`/`updated_by` are only populated for status
/// changes. Optional fields are omitted from serialization when absent.
#[derive(Debug, Clone, Serialize, Default)]
pub struct TaskEvent {
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<String>,
    pub tags: Vec<String>,
}

/// Comment event payload; `mentions` drives personal mention deliveries.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CommentEvent {
    pub comment_id: i64,
    pub task_id: TaskId,
    pub project_id: ProjectId,
    pub content: String,
    pub author_id: UserId,
    pub author_name: String,
    pub mentions: Vec<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<i64>,
}

/// Project event payload.
///
/// For membership events `owner_id`/`owner_name` carry the acting user and
/// `member_id`/`member_name` the affected member.
#[derive(Debug, Clone, Serialize, Default)]
pub struct ProjectEvent {
    pub project_id: ProjectId,
    pub workspace_id: WorkspaceId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub owner_id: UserId,
    pub owner_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

/// Durable notification payload, delivered personally to the recipient.
#[derive(Debug, Clone, Serialize, Default)]
pub struct NotificationEvent {
    pub notification_id: i64,
    pub recipient_id: UserId,
    pub title: String,
    pub message: String,
    pub notification_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_id: Option<i64>,
    pub is_read: bool,
}

/// Presence status carried in `PresenceEvent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresenceStatus {
    Online,
    Offline,
    Typing,
    StopTyping,
}

/// Presence event payload (online/offline/typing/stop-typing).
#[derive(Debug, Clone, Serialize)]
pub struct PresenceEvent {
    pub user_id: UserId,
    pub username: String,
    pub status: PresenceStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
}

/// Reply payload for the `get_room_members` control command.
#[derive(Debug, Clone, Serialize)]
pub struct RoomMembersReply {
    pub members: Vec<UserId>,
}

/// Error payload answered on the offending connection.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReply {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// Short human-readable note (acknowledgements, heartbeats).
#[derive(Debug, Clone, Serialize)]
pub struct SystemNote {
    pub message: String,
}

/// Client → Server message
///
/// Control vocabulary parsed from inbound text frames. Uses tagged enum
/// with snake_case naming; anything else is answered with an `error`
/// envelope.
#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Liveness probe; answered with a pong heartbeat
    Heartbeat,
    /// Join a room by id (`user:*` rooms are refused)
    JoinRoom { room_id: RoomId },
    /// Leave a room by id (`user:*` rooms are refused)
    LeaveRoom { room_id: RoomId },
    /// Typing started in a project
    Typing { project_id: ProjectId },
    /// Typing stopped in a project
    StopTyping { project_id: ProjectId },
    /// Ask who is currently in a room
    GetRoomMembers { room_id: RoomId },
    /// Ask for registry-wide connection statistics
    GetConnectionStats,
}

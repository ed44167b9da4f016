//! Basic type definitions for the gateway
//!
//! Provides newtype wrappers for type safety:
//! - `UserId`, `ProjectId`, `WorkspaceId`, `TaskId`: numeric domain identifiers
//! - `ConnectionId`: UUID-based unique connection identifier
//! - `RoomId`: typed `kind:id` room identifier

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Unique user identifier (newtype pattern)
///
/// Wraps the numeric id users carry in the surrounding system.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique project identifier (newtype pattern)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ProjectId(pub i64);

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique workspace identifier (newtype pattern)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct WorkspaceId(pub i64);

impl fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique task identifier (newtype pattern)
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaskId(pub i64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique connection identifier (newtype pattern)
///
/// Wraps a UUID v4 so a user's parallel connections (multiple tabs,
/// multiple devices) stay distinguishable inside the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Create a new random connection ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The four kinds of room a connection can belong to.
///
/// `User` rooms are personal: the registry creates and destroys them as part
/// of the connection lifecycle, and clients cannot join or leave them through
/// control messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    User,
    Project,
    Workspace,
    Task,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::User => "user",
            RoomKind::Project => "project",
            RoomKind::Workspace => "workspace",
            RoomKind::Task => "task",
        }
    }
}

impl fmt::Display for RoomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomKind {
    type Err = ParseRoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(RoomKind::User),
            "project" => Ok(RoomKind::Project),
            "workspace" => Ok(RoomKind::Workspace),
            "task" => Ok(RoomKind::Task),
            other => Err(ParseRoomIdError(other.to_string())),
        }
    }
}

/// Error returned when a string is not a valid `kind:id` room identifier.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid room id: {0}")]
pub struct ParseRoomIdError(pub String);

/// Room identifier in `kind:id` form, e.g. `project:42` or `user:7`.
///
/// Serializes to and from its string form so envelopes and control messages
/// carry the same `kind:id` text the rest of the system uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct RoomId {
    kind: RoomKind,
    id: i64,
}

impl RoomId {
    /// Personal room for a user (`user:{id}`)
    pub fn user(user: UserId) -> Self {
        Self {
            kind: RoomKind::User,
            id: user.0,
        }
    }

    /// Project room (`project:{id}`)
    pub fn project(project: ProjectId) -> Self {
        Self {
            kind: RoomKind::Project,
            id: project.0,
        }
    }

    /// Workspace room (`workspace:{id}`)
    pub fn workspace(workspace: WorkspaceId) -> Self {
        Self {
            kind: RoomKind::Workspace,
            id: workspace.0,
        }
    }

    /// Task room (`task:{id}`)
    pub fn task(task: TaskId) -> Self {
        Self {
            kind: RoomKind::Task,
            id: task.0,
        }
    }

    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    /// True for `user:*` rooms, which only the registry itself may mutate.
    pub fn is_personal(&self) -> bool {
        self.kind == RoomKind::User
    }

    /// The project this room refers to, if it is a project room.
    pub fn project_id(&self) -> Option<ProjectId> {
        match self.kind {
            RoomKind::Project => Some(ProjectId(self.id)),
            _ => None,
        }
    }

    /// The workspace this room refers to, if it is a workspace room.
    pub fn workspace_id(&self) -> Option<WorkspaceId> {
        match self.kind {
            RoomKind::Workspace => Some(WorkspaceId(self.id)),
            _ => None,
        }
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

impl FromStr for RoomId {
    type Err = ParseRoomIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s.split_once(':').ok_or_else(|| ParseRoomIdError(s.to_string()))?;
        let kind = kind.parse::<RoomKind>().map_err(|_| ParseRoomIdError(s.to_string()))?;
        let id = id.parse::<i64>().map_err(|_| ParseRoomIdError(s.to_string()))?;
        Ok(Self { kind, id })
    }
}

impl From<RoomId> for String {
    fn from(room: RoomId) -> Self {
        room.to_string()
    }
}

impl TryFrom<String> for RoomId {
    type Error = ParseRoomIdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_unique() {
        let id1 = ConnectionId::new();
        let id2 = ConnectionId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_room_id_display() {
        assert_eq!(RoomId::user(UserId(7)).to_string(), "user:7");
        assert_eq!(RoomId::project(ProjectId(42)).to_string(), "project:42");
        assert_eq!(RoomId::workspace(WorkspaceId(3)).to_string(), "workspace:3");
        assert_eq!(RoomId::task(TaskId(99)).to_string(), "task:99");
    }

    #[test]
    fn test_room_id_parse() {
        let room: RoomId = "project:42".parse().unwrap();
        assert_eq!(room, RoomId::project(ProjectId(42)));
        assert_eq!(room.kind(), RoomKind::Project);
    }

    #[test]
    fn test_room_id_parse_rejects_garbage() {
        assert!("lobby".parse::<RoomId>().is_err());
        assert!("project".parse::<RoomId>().is_err());
        assert!("project:abc".parse::<RoomId>().is_err());
        assert!("channel:1".parse::<RoomId>().is_err());
    }

    #[test]
    fn test_room_id_personal_detection() {
        assert!(RoomId::user(UserId(1)).is_personal());
        assert!(!RoomId::task(TaskId(1)).is_personal());
    }

    #[test]
    fn test_room_id_project_extraction() {
        assert_eq!(
            RoomId::project(ProjectId(8)).project_id(),
            Some(ProjectId(8))
        );
        assert_eq!(RoomId::workspace(WorkspaceId(8)).project_id(), None);
    }

    #[test]
    fn test_room_id_serde_as_string() {
        let json = serde_json::to_string(&RoomId::task(TaskId(5))).unwrap();
        assert_eq!(json, "\"task:5\"");
        let back: RoomId = serde_json::from_str("\"user:12\"").unwrap();
        assert_eq!(back, RoomId::user(UserId(12)));
    }

    #[test]
    fn test_user_id_serde_transparent() {
        assert_eq!(serde_json::to_string(&UserId(31)).unwrap(), "31");
        let back: UserId = serde_json::from_str("31").unwrap();
        assert_eq!(back, UserId(31));
    }
}

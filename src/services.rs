//! Collaborator interfaces
//!
//! The gateway does not own users, memberships or durable notifications; it
//! consumes them through these trait seams. In-memory implementations back
//! the demo binary and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::NotificationEvent;
use crate::types::{ProjectId, UserId, WorkspaceId};

/// Resolved user identity
///
/// `username` feeds presence events so other clients can render who went
/// online or is typing without another lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub username: String,
}

/// Turns a bearer credential into a user identity.
///
/// Consulted exactly once per connection, at handshake time. `None` means
/// the connection is refused; sessions never re-validate per message.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, credential: &str) -> Option<Identity>;
}

/// Answers which projects and workspaces a user belongs to.
///
/// Queried at connect time to derive the rooms a user is auto-joined into.
/// Implementations degrade to an empty list on lookup failure; a user with
/// no memberships still gets a working connection.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn project_ids(&self, user_id: UserId) -> Vec<ProjectId>;
    async fn workspace_ids(&self, user_id: UserId) -> Vec<WorkspaceId>;
}

/// Durable notification sink.
///
/// The domain layer records a notification here before (or alongside)
/// handing it to `EventEmitter::emit_notification`; realtime delivery is
/// never a substitute for the durable record.
#[async_trait]
pub trait NotificationRecorder: Send + Sync {
    async fn record(&self, notification: &NotificationEvent);
}

/// Fixed token table, for the demo binary and tests.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Identity>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a bearer token to an identity
    pub fn insert(&mut self, token: impl Into<String>, identity: Identity) {
        self.tokens.insert(token.into(), identity);
    }
}

#[async_trait]
impl IdentityResolver for StaticTokens {
    async fn resolve(&self, credential: &str) -> Option<Identity> {
        self.tokens.get(credential).cloned()
    }
}

/// Fixed membership table, for the demo binary and tests.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    projects: HashMap<UserId, Vec<ProjectId>>,
    workspaces: HashMap<UserId, Vec<WorkspaceId>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_project(&mut self, user_id: UserId, project_id: ProjectId) {
        self.projects.entry(user_id).or_default().push(project_id);
    }

    pub fn add_workspace(&mut self, user_id: UserId, workspace_id: WorkspaceId) {
        self.workspaces.entry(user_id).or_default().push(workspace_id);
    }
}

#[async_trait]
impl MembershipDirectory for StaticDirectory {
    async fn project_ids(&self, user_id: UserId) -> Vec<ProjectId> {
        self.projects.get(&user_id).cloned().unwrap_or_default()
    }

    async fn workspace_ids(&self, user_id: UserId) -> Vec<WorkspaceId> {
        self.workspaces.get(&user_id).cloned().unwrap_or_default()
    }
}

/// Keeps recorded notifications in memory, for tests.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    entries: Mutex<Vec<NotificationEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far, oldest first
    pub async fn recorded(&self) -> Vec<NotificationEvent> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl NotificationRecorder for MemoryRecorder {
    async fn record(&self, notification: &NotificationEvent) {
        self.entries.lock().await.push(notification.clone());
    }
}

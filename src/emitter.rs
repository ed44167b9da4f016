//! Event emitter
//!
//! Translates domain facts ("task 42 changed status") into concrete
//! deliveries: which room to broadcast to, who gets a personal copy, who is
//! excluded. Every `emit_*` is fire-and-forget for the caller; delivery
//! failures are absorbed inside the registry and never propagate back into
//! the domain layer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::message::{
    CommentEvent, Envelope, EventKind, EventPayload, NotificationEvent, PresenceEvent,
    PresenceStatus, ProjectEvent, TaskEvent,
};
use crate::registry::ConnectionRegistry;
use crate::types::{ProjectId, RoomId, TaskId, UserId, WorkspaceId};

/// Fan-out policy layer on top of the registry
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct EventEmitter {
    registry: Arc<ConnectionRegistry>,
}

impl EventEmitter {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Task created: broadcast to the project room; when an assignee exists
    /// and is not the creator, an independent personal `task_assigned`
    /// alert goes to them as well.
    pub async fn emit_task_created(&self, task: TaskEvent) {
        let room = RoomId::project(task.project_id);
        let created_by = task.created_by;
        let assignee = task.assignee_id;

        let envelope = Envelope::new(EventKind::TaskCreated, EventPayload::Task(task.clone()))
            .for_user(created_by);
        let delivered = self.registry.broadcast_to_room(&room, envelope, None).await;
        debug!("task_created for task {} reached {} connection(s)", task.task_id, delivered);

        if let Some(assignee) = assignee {
            if created_by != Some(assignee) {
                let alert = Envelope::new(EventKind::TaskAssigned, EventPayload::Task(task))
                    .in_room(RoomId::user(assignee))
                    .for_user(assignee);
                self.registry.send_to_user(assignee, alert).await;
            }
        }
    }

    /// Task updated: project-room broadcast only.
    pub async fn emit_task_updated(&self, task: TaskEvent, updated_by: UserId) {
        let room = RoomId::project(task.project_id);
        let envelope = Envelope::new(EventKind::TaskUpdated, EventPayload::Task(task))
            .for_user(updated_by);
        self.registry.broadcast_to_room(&room, envelope, None).await;
    }

    /// Task status changed: project-room broadcast carrying the old and new
    /// status; no personal alert. The caller populates `old_status`,
    /// `new_status` and `updated_by` on the payload.
    pub async fn emit_task_status_changed(&self, task: TaskEvent) {
        let room = RoomId::project(task.project_id);
        let updated_by = task.updated_by;
        let envelope = Envelope::new(EventKind::TaskStatusChanged, EventPayload::Task(task))
            .for_user(updated_by);
        self.registry.broadcast_to_room(&room, envelope, None).await;
    }

    /// Task deleted: project-room broadcast with a minimal payload.
    pub async fn emit_task_deleted(
        &self,
        task_id: TaskId,
        project_id: ProjectId,
        title: impl Into<String>,
        deleted_by: UserId,
    ) {
        let room = RoomId::project(project_id);
        let task = TaskEvent {
            task_id,
            project_id,
            title: title.into(),
            ..Default::default()
        };
        let envelope = Envelope::new(EventKind::TaskDeleted, EventPayload::Task(task))
            .for_user(deleted_by);
        self.registry.broadcast_to_room(&room, envelope, None).await;
    }

    /// Comment created: project-room broadcast, then one personal
    /// `comment_mention` per mentioned user, skipping the author.
    pub async fn emit_comment_created(&self, comment: CommentEvent) {
        let room = RoomId::project(comment.project_id);
        let author = comment.author_id;
        let mentions = comment.mentions.clone();

        let envelope =
            Envelope::new(EventKind::CommentCreated, EventPayload::Comment(comment.clone()))
                .for_user(author);
        self.registry.broadcast_to_room(&room, envelope, None).await;

        for mentioned in mentions {
            if mentioned == author {
                continue;
            }
            let mention =
                Envelope::new(EventKind::CommentMention, EventPayload::Comment(comment.clone()))
                    .in_room(RoomId::user(mentioned))
                    .for_user(mentioned);
            let delivered = self.registry.send_to_user(mentioned, mention).await;
            debug!("comment_mention to user {}: {} connection(s)", mentioned, delivered);
        }
    }

    /// Comment updated: project-room broadcast only.
    pub async fn emit_comment_updated(&self, comment: CommentEvent) {
        let room = RoomId::project(comment.project_id);
        let author = comment.author_id;
        let envelope = Envelope::new(EventKind::CommentUpdated, EventPayload::Comment(comment))
            .for_user(author);
        self.registry.broadcast_to_room(&room, envelope, None).await;
    }

    /// Comment deleted: project-room broadcast; the payload carries ids
    /// only, the content is gone.
    pub async fn emit_comment_deleted(
        &self,
        comment_id: i64,
        task_id: TaskId,
        project_id: ProjectId,
        deleted_by: UserId,
    ) {
        let room = RoomId::project(project_id);
        let comment = CommentEvent {
            comment_id,
            task_id,
            project_id,
            content: String::new(),
            author_id: deleted_by,
            author_name: String::new(),
            ..Default::default()
        };
        let envelope = Envelope::new(EventKind::CommentDeleted, EventPayload::Comment(comment))
            .for_user(deleted_by);
        self.registry.broadcast_to_room(&room, envelope, None).await;
    }

    /// Member added: broadcast to the project room, force-join the new
    /// member (so later broadcasts reach them even if they just connected),
    /// then hand them a personal copy of the same event.
    ///
    /// `project.member_id` identifies the added member and
    /// `project.owner_id` the acting user.
    pub async fn emit_project_member_added(&self, project: ProjectEvent) {
        let room = RoomId::project(project.project_id);
        let actor = project.owner_id;
        let Some(member) = project.member_id else {
            warn!("project_member_added for project {} without member id", project.project_id);
            return;
        };

        let envelope =
            Envelope::new(EventKind::ProjectMemberAdded, EventPayload::Project(project.clone()))
                .for_user(actor);
        self.registry.broadcast_to_room(&room, envelope, None).await;

        self.registry.join_room(member, room).await;

        let personal =
            Envelope::new(EventKind::ProjectMemberAdded, EventPayload::Project(project))
                .in_room(RoomId::user(member))
                .for_user(member);
        self.registry.send_to_user(member, personal).await;
    }

    /// Member removed: broadcast to the project room first (the departing
    /// member still sees it), then evict them from the room.
    pub async fn emit_project_member_removed(&self, project: ProjectEvent) {
        let room = RoomId::project(project.project_id);
        let actor = project.owner_id;
        let Some(member) = project.member_id else {
            warn!("project_member_removed for project {} without member id", project.project_id);
            return;
        };

        let envelope =
            Envelope::new(EventKind::ProjectMemberRemoved, EventPayload::Project(project))
                .for_user(actor);
        self.registry.broadcast_to_room(&room, envelope, None).await;

        self.registry.leave_room(member, &room).await;
    }

    /// New durable notification: personal delivery to the recipient.
    /// Recording it in the durable store is the domain layer's job and
    /// happens independently of this realtime push.
    pub async fn emit_notification(&self, notification: NotificationEvent) {
        let recipient = notification.recipient_id;
        let envelope = Envelope::new(
            EventKind::NotificationNew,
            EventPayload::Notification(notification),
        )
        .in_room(RoomId::user(recipient))
        .for_user(recipient);
        let delivered = self.registry.send_to_user(recipient, envelope).await;
        debug!("notification_new to user {}: {} connection(s)", recipient, delivered);
    }

    /// Presence online: broadcast to every given project room, excluding
    /// the user themselves.
    pub async fn emit_user_online(&self, user_id: UserId, username: &str, project_ids: &[ProjectId]) {
        self.emit_presence(user_id, username, PresenceStatus::Online, None, project_ids)
            .await;
    }

    /// Presence offline: same fan-out as online.
    pub async fn emit_user_offline(
        &self,
        user_id: UserId,
        username: &str,
        project_ids: &[ProjectId],
    ) {
        self.emit_presence(user_id, username, PresenceStatus::Offline, None, project_ids)
            .await;
    }

    /// Typing started in one project.
    pub async fn emit_user_typing(&self, user_id: UserId, username: &str, project_id: ProjectId) {
        self.emit_presence(
            user_id,
            username,
            PresenceStatus::Typing,
            Some(project_id),
            &[project_id],
        )
        .await;
    }

    /// Typing stopped in one project.
    pub async fn emit_user_stop_typing(
        &self,
        user_id: UserId,
        username: &str,
        project_id: ProjectId,
    ) {
        self.emit_presence(
            user_id,
            username,
            PresenceStatus::StopTyping,
            Some(project_id),
            &[project_id],
        )
        .await;
    }

    async fn emit_presence(
        &self,
        user_id: UserId,
        username: &str,
        status: PresenceStatus,
        payload_project: Option<ProjectId>,
        project_ids: &[ProjectId],
    ) {
        let kind = match status {
            PresenceStatus::Online => EventKind::UserOnline,
            PresenceStatus::Offline => EventKind::UserOffline,
            PresenceStatus::Typing => EventKind::UserTyping,
            PresenceStatus::StopTyping => EventKind::UserStopTyping,
        };

        for project_id in project_ids {
            let room = RoomId::project(*project_id);
            let envelope = Envelope::new(
                kind,
                EventPayload::Presence(PresenceEvent {
                    user_id,
                    username: username.to_string(),
                    status,
                    project_id: payload_project,
                }),
            )
            .for_user(user_id);
            self.registry
                .broadcast_to_room(&room, envelope, Some(user_id))
                .await;
        }
    }

    /// Join a user into all their project rooms (connect-time derivation).
    pub async fn join_project_rooms(&self, user_id: UserId, project_ids: &[ProjectId]) {
        for project_id in project_ids {
            self.registry
                .join_room(user_id, RoomId::project(*project_id))
                .await;
        }
    }

    /// Join a user into all their workspace rooms (connect-time derivation).
    pub async fn join_workspace_rooms(&self, user_id: UserId, workspace_ids: &[WorkspaceId]) {
        for workspace_id in workspace_ids {
            self.registry
                .join_room(user_id, RoomId::workspace(*workspace_id))
                .await;
        }
    }
}

//! Notification dispatcher: turns state changes into typed envelopes and
//! fans them out through the connection registry.
//!
//! This module owns the event-type vocabulary. The vocabulary is open: new
//! event kinds can be added without a protocol version bump, but every
//! event carries a structured `data` object, never a bare scalar. Delivery
//! is best-effort and decoupled from the mutation that produced the event;
//! a failed push is recovered inside the registry and never reaches the
//! mutation's caller.

use std::sync::Arc;

use serde_json::Value;

use taskhub_proto::event::Envelope;
use taskhub_proto::project::ProjectId;

use crate::registry::ConnectionRegistry;

/// A new entity registered. Global scope.
pub const ENTITY_REGISTERED: &str = "entity_registered";
/// Project lifecycle events.
pub const PROJECT_CREATED: &str = "project_created";
pub const PROJECT_UPDATED: &str = "project_updated";
pub const PROJECT_DELETED: &str = "project_deleted";
/// Stage lifecycle events.
pub const STAGE_CREATED: &str = "stage_created";
pub const STAGE_UPDATED: &str = "stage_updated";
pub const STAGE_DELETED: &str = "stage_deleted";
/// Task lifecycle events.
pub const TASK_CREATED: &str = "task_created";
pub const TASK_UPDATED: &str = "task_updated";
pub const TASK_DELETED: &str = "task_deleted";
pub const TASK_ASSIGNED: &str = "task_assigned";
pub const TASK_UNASSIGNED: &str = "task_unassigned";
/// A comment was added to a task.
pub const COMMENT_ADDED: &str = "comment_added";
/// Connection lifecycle messages, sent to a single handle.
pub const CONNECTED: &str = "connected";
pub const ECHO: &str = "echo";

/// Builds envelopes and pushes them through the registry.
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher pushing through the given registry.
    #[must_use]
    pub const fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Builds an envelope and broadcasts it to its natural audience.
    ///
    /// With a `project_id` the event reaches that project's subscribers and
    /// all global-only subscribers; without one it reaches every open
    /// connection. Returns the envelope that was pushed. Envelope
    /// construction itself is pure; the timestamp is captured here, in UTC.
    pub async fn notify(
        &self,
        event_type: &str,
        data: Value,
        project_id: Option<ProjectId>,
    ) -> Envelope {
        let envelope = Envelope::new(event_type, data, project_id);
        tracing::debug!(
            event = %event_type,
            project = ?project_id,
            "dispatching notification"
        );
        self.registry.broadcast(&envelope).await;
        envelope
    }
}

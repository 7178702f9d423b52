//! Assignment ledger: the entity/task claim relation and task mutations
//! with their status side effects.
//!
//! The ledger validates references against the store, applies the mutation
//! atomically, and returns the post-mutation task snapshot together with a
//! [`TaskChange`] describing what happened. It knows nothing about
//! transport; callers hand the change description to the notification
//! dispatcher.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use taskhub_proto::entity::EntityId;
use taskhub_proto::project::StageId;
use taskhub_proto::skill::SkillSet;
use taskhub_proto::task::{Task, TaskId, TaskStatus};

use crate::store::{NewTask, Store, StoreError};

/// What an assignment-ledger mutation did, for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskChange {
    /// The task was created.
    Created,
    /// Fields changed (including status transitions).
    Updated,
    /// The task was deleted.
    Deleted,
    /// An entity joined the assignee set (no-op adds still report this;
    /// the resulting state is identical either way).
    Assigned(EntityId),
    /// An entity left the assignee set.
    Unassigned(EntityId),
}

/// Partial update for a task, as accepted by the PATCH endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status; transitioning into `Completed` stamps `completed_at`
    /// exactly once.
    pub status: Option<TaskStatus>,
    /// Move to a different board column.
    pub stage_id: Option<StageId>,
    /// Move under a different parent task (cycle-checked).
    pub parent_task_id: Option<TaskId>,
    /// Replace the required skill set.
    pub required_skills: Option<SkillSet>,
    /// New priority.
    pub priority: Option<i64>,
}

impl TaskPatch {
    /// True if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.stage_id.is_none()
            && self.parent_task_id.is_none()
            && self.required_skills.is_none()
            && self.priority.is_none()
    }
}

/// Maintains the many-to-many entity/task claim relation.
pub struct AssignmentLedger {
    store: Arc<Store>,
}

impl AssignmentLedger {
    /// Creates a ledger backed by the given store.
    #[must_use]
    pub const fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Creates a task.
    ///
    /// # Errors
    ///
    /// Propagates reference-validation failures from the store.
    pub async fn create_task(&self, new: NewTask) -> Result<(Task, TaskChange), StoreError> {
        let task = self.store.create_task(new).await?;
        Ok((task, TaskChange::Created))
    }

    /// Adds an entity to a task's assignee set.
    ///
    /// Idempotent: assigning an entity already present is a no-op that
    /// still returns the current task state. Both the task and the entity
    /// must exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if either is absent.
    pub async fn assign(
        &self,
        task_id: TaskId,
        entity_id: EntityId,
    ) -> Result<(Task, TaskChange), StoreError> {
        self.store.get_entity(entity_id).await?;
        let task = self
            .store
            .mutate_task(task_id, |task| {
                if task.add_assignee(entity_id) {
                    task.updated_at = Utc::now();
                }
                Ok(())
            })
            .await?;
        Ok((task, TaskChange::Assigned(entity_id)))
    }

    /// An entity claims a task for itself.
    ///
    /// Same contract as [`assign`](Self::assign); eligibility is advisory
    /// (the available-tasks listing) and deliberately not enforced here.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task is absent.
    pub async fn self_assign(
        &self,
        task_id: TaskId,
        entity_id: EntityId,
    ) -> Result<(Task, TaskChange), StoreError> {
        self.assign(task_id, entity_id).await
    }

    /// Removes an entity from a task's assignee set.
    ///
    /// Removing a non-member is a no-op, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task or entity is absent.
    pub async fn unassign(
        &self,
        task_id: TaskId,
        entity_id: EntityId,
    ) -> Result<(Task, TaskChange), StoreError> {
        self.store.get_entity(entity_id).await?;
        let task = self
            .store
            .mutate_task(task_id, |task| {
                if task.remove_assignee(entity_id) {
                    task.updated_at = Utc::now();
                }
                Ok(())
            })
            .await?;
        Ok((task, TaskChange::Unassigned(entity_id)))
    }

    /// Applies a partial update to a task.
    ///
    /// Any update touches `updated_at`. An update that sets the status to
    /// `Completed` while `completed_at` is unset stamps `completed_at`
    /// with the current UTC time; later status changes never re-stamp it.
    /// Stage moves are checked against the task's project; parent moves
    /// are cycle-checked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for missing references,
    /// [`StoreError::StageProjectMismatch`], or [`StoreError::ParentCycle`].
    pub async fn apply_update(
        &self,
        task_id: TaskId,
        patch: TaskPatch,
    ) -> Result<(Task, TaskChange), StoreError> {
        if let Some(stage_id) = patch.stage_id {
            let task = self.store.get_task(task_id).await?;
            let stage = self.store.get_stage(stage_id).await?;
            if stage.project_id != task.project_id {
                return Err(StoreError::StageProjectMismatch);
            }
        }
        if let Some(parent_id) = patch.parent_task_id {
            self.store.reparent_task(task_id, Some(parent_id)).await?;
        }

        let task = self
            .store
            .mutate_task(task_id, |task| {
                if let Some(title) = patch.title {
                    task.title = title;
                }
                if let Some(description) = patch.description {
                    task.description = Some(description);
                }
                if let Some(stage_id) = patch.stage_id {
                    task.stage_id = Some(stage_id);
                }
                if let Some(required_skills) = patch.required_skills {
                    task.required_skills = required_skills;
                }
                if let Some(priority) = patch.priority {
                    task.priority = priority;
                }
                if let Some(status) = patch.status {
                    task.status = status;
                    if status == TaskStatus::Completed && task.completed_at.is_none() {
                        task.completed_at = Some(Utc::now());
                    }
                }
                task.updated_at = Utc::now();
                Ok(())
            })
            .await?;
        Ok((task, TaskChange::Updated))
    }

    /// Deletes a task.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn delete_task(&self, task_id: TaskId) -> Result<(Task, TaskChange), StoreError> {
        let task = self.store.delete_task(task_id).await?;
        Ok((task, TaskChange::Deleted))
    }
}

//! Tasks: the unit of work entities claim and move across board stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;
use crate::project::{ProjectId, StageId};
use crate::skill::SkillSet;

/// Unique identifier for a task.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle stage of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Not started; claimable.
    Pending,
    /// Being worked on; still claimable by additional entities.
    InProgress,
    /// Work finished, awaiting review.
    InReview,
    /// Done. First transition into this status stamps `completed_at`.
    Completed,
    /// Cannot proceed.
    Blocked,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::InReview => write!(f, "in_review"),
            Self::Completed => write!(f, "completed"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// A unit of work within a project.
///
/// Tasks form a tree via `parent_task_id`; cycles are rejected at the point
/// the parent reference is set. The assignee list is an ordered set: an
/// entity appears at most once, in the order it was first assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier.
    pub id: TaskId,
    /// Short summary of the work.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Owning project.
    pub project_id: ProjectId,
    /// Board column, if placed on one.
    pub stage_id: Option<StageId>,
    /// Parent task, if this is a subtask.
    pub parent_task_id: Option<TaskId>,
    /// Skills a claimant must overlap with. Empty means open to anyone.
    pub required_skills: SkillSet,
    /// Higher values are more urgent.
    pub priority: i64,
    /// Entities currently assigned, in assignment order, no duplicates.
    pub assignees: Vec<EntityId>,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// Last time any field changed.
    pub updated_at: DateTime<Utc>,
    /// Stamped exactly once, on the first transition into `Completed`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Returns `true` if the entity is in the assignee set.
    #[must_use]
    pub fn is_assigned(&self, entity_id: EntityId) -> bool {
        self.assignees.contains(&entity_id)
    }

    /// Adds an entity to the assignee set.
    ///
    /// Returns `true` if the set changed; adding an entity already present
    /// is a no-op, not an error.
    pub fn add_assignee(&mut self, entity_id: EntityId) -> bool {
        if self.is_assigned(entity_id) {
            return false;
        }
        self.assignees.push(entity_id);
        true
    }

    /// Removes an entity from the assignee set.
    ///
    /// Returns `true` if the set changed; removing a non-member is a no-op.
    pub fn remove_assignee(&mut self, entity_id: EntityId) -> bool {
        let before = self.assignees.len();
        self.assignees.retain(|id| *id != entity_id);
        self.assignees.len() != before
    }
}

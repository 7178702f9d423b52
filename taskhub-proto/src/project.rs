//! Projects and their board stages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityId;

/// Unique identifier for a project.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ProjectId(pub u64);

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a stage within a project board.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct StageId(pub u64);

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Review state of a newly proposed project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting review.
    Pending,
    /// Cleared for work.
    Approved,
    /// Rejected by a reviewer.
    Rejected,
}

/// A project grouping tasks and stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project identifier.
    pub id: ProjectId,
    /// Project name.
    pub name: String,
    /// Optional free-form description.
    pub description: Option<String>,
    /// Entity that proposed the project.
    pub creator_id: EntityId,
    /// Review state; new projects start as `Pending`.
    pub approval_status: ApprovalStatus,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
    /// Last time any project field changed.
    pub updated_at: DateTime<Utc>,
}

/// A named column on a project's task board (e.g. "To Do").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    /// Unique stage identifier.
    pub id: StageId,
    /// Owning project.
    pub project_id: ProjectId,
    /// Column name.
    pub name: String,
    /// Optional description shown on the board.
    pub description: Option<String>,
    /// Left-to-right position on the board, ascending.
    pub order: i64,
    /// When the stage was created.
    pub created_at: DateTime<Utc>,
}

/// The stage columns every new project starts with.
#[must_use]
pub fn default_stages() -> Vec<(&'static str, &'static str, i64)> {
    vec![
        ("Backlog", "Tasks to be done", 1),
        ("To Do", "Ready to start", 2),
        ("In Progress", "Currently being worked on", 3),
        ("Review", "Awaiting review", 4),
        ("Done", "Completed tasks", 5),
    ]
}

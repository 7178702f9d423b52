//! Pure skill-matching rules deciding which tasks an entity may self-claim.
//!
//! A task is available to an entity when it is still claimable (`Pending`
//! or `InProgress`) and either requires no skills or shares at least one
//! skill with the entity. A partial match suffices; the entity does not
//! need to cover the full required set.

use crate::entity::Entity;
use crate::task::{Task, TaskStatus};

/// Returns `true` if the entity's skills qualify it to claim the task.
///
/// Tasks outside `Pending`/`InProgress` are never available. An entity
/// with no skills qualifies only for tasks with no required skills.
#[must_use]
pub fn is_available_to(task: &Task, entity: &Entity) -> bool {
    if !matches!(task.status, TaskStatus::Pending | TaskStatus::InProgress) {
        return false;
    }
    task.required_skills.is_empty() || entity.skills.overlaps(&task.required_skills)
}

/// Filters the candidate tasks down to those the entity may claim.
///
/// No side effects; the output preserves the relative order of the input.
#[must_use]
pub fn available_tasks(entity: &Entity, tasks: Vec<Task>) -> Vec<Task> {
    tasks
        .into_iter()
        .filter(|task| is_available_to(task, entity))
        .collect()
}

//! In-memory backing store for entities, projects, stages, tasks, and
//! comments.
//!
//! The store is the repository collaborator for the assignment ledger and
//! the REST layer: plain CRUD with `NotFound` semantics and referential
//! checks, no knowledge of transport or notifications. Every map is guarded
//! by its own [`RwLock`]; task mutations run read-modify-write under the
//! exclusive task-map lock, which serializes concurrent updates to the same
//! task (no lost assignee updates).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::RwLock;

use taskhub_proto::comment::{Comment, CommentId};
use taskhub_proto::entity::{Entity, EntityId, EntityType};
use taskhub_proto::project::{ApprovalStatus, Project, ProjectId, Stage, StageId};
use taskhub_proto::skill::SkillSet;
use taskhub_proto::task::{Task, TaskId, TaskStatus};

use crate::error::ApiError;

/// Errors raised by store operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The referenced record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Setting this parent reference would make the task its own ancestor.
    #[error("parent reference would create a subtask cycle")]
    ParentCycle,

    /// The parent task belongs to a different project.
    #[error("parent task belongs to a different project")]
    ParentProjectMismatch,

    /// The stage belongs to a different project.
    #[error("stage belongs to a different project")]
    StageProjectMismatch,

    /// An entity with this email already exists.
    #[error("email already registered")]
    EmailTaken,
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => Self::NotFound(what),
            StoreError::EmailTaken => Self::Conflict(err.to_string()),
            StoreError::ParentCycle
            | StoreError::ParentProjectMismatch
            | StoreError::StageProjectMismatch => Self::Validation(err.to_string()),
        }
    }
}

/// Fields for registering a new entity.
#[derive(Debug, Clone)]
pub struct NewEntity {
    /// Display name.
    pub name: String,
    /// Human or agent.
    pub entity_type: EntityType,
    /// Contact email; uniqueness is enforced when present.
    pub email: Option<String>,
    /// Agent API key.
    pub api_key: Option<String>,
    /// Salted password hash for humans.
    pub password_hash: Option<String>,
    /// Initial skill set.
    pub skills: SkillSet,
}

/// Fields for creating a new task.
#[derive(Debug, Clone)]
pub struct NewTask {
    /// Short summary.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Owning project; must exist.
    pub project_id: ProjectId,
    /// Board column; must belong to the same project when present.
    pub stage_id: Option<StageId>,
    /// Parent task; must exist in the same project.
    pub parent_task_id: Option<TaskId>,
    /// Skills a claimant must overlap with.
    pub required_skills: SkillSet,
    /// Higher is more urgent.
    pub priority: i64,
}

/// Partial update for a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New approval status.
    pub approval_status: Option<ApprovalStatus>,
}

/// Partial update for a stage.
#[derive(Debug, Clone, Default)]
pub struct StagePatch {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New board position.
    pub order: Option<i64>,
}

/// Filters for listing tasks.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskFilter {
    /// Restrict to one project.
    pub project_id: Option<ProjectId>,
    /// Restrict to one board column.
    pub stage_id: Option<StageId>,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
}

/// In-memory repository with per-record-type locks.
pub struct Store {
    entities: RwLock<HashMap<EntityId, Entity>>,
    projects: RwLock<HashMap<ProjectId, Project>>,
    stages: RwLock<HashMap<StageId, Stage>>,
    tasks: RwLock<HashMap<TaskId, Task>>,
    comments: RwLock<HashMap<CommentId, Comment>>,
    next_entity_id: AtomicU64,
    next_project_id: AtomicU64,
    next_stage_id: AtomicU64,
    next_task_id: AtomicU64,
    next_comment_id: AtomicU64,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            projects: RwLock::new(HashMap::new()),
            stages: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
            comments: RwLock::new(HashMap::new()),
            next_entity_id: AtomicU64::new(1),
            next_project_id: AtomicU64::new(1),
            next_stage_id: AtomicU64::new(1),
            next_task_id: AtomicU64::new(1),
            next_comment_id: AtomicU64::new(1),
        }
    }

    // -----------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------

    /// Registers a new entity, enforcing email uniqueness.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::EmailTaken`] if the email is already in use.
    pub async fn create_entity(&self, new: NewEntity) -> Result<Entity, StoreError> {
        let mut entities = self.entities.write().await;
        if let Some(email) = &new.email
            && entities.values().any(|e| e.email.as_ref() == Some(email))
        {
            return Err(StoreError::EmailTaken);
        }
        let entity = Entity {
            id: EntityId(self.next_entity_id.fetch_add(1, Ordering::Relaxed)),
            name: new.name,
            entity_type: new.entity_type,
            email: new.email,
            api_key: new.api_key,
            password_hash: new.password_hash,
            skills: new.skills,
            is_active: true,
            created_at: Utc::now(),
        };
        entities.insert(entity.id, entity.clone());
        drop(entities);
        Ok(entity)
    }

    /// Looks up an entity by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn get_entity(&self, id: EntityId) -> Result<Entity, StoreError> {
        let entities = self.entities.read().await;
        entities
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("entity"))
    }

    /// Finds an entity by email.
    pub async fn entity_by_email(&self, email: &str) -> Option<Entity> {
        let entities = self.entities.read().await;
        entities
            .values()
            .find(|e| e.email.as_deref() == Some(email))
            .cloned()
    }

    /// Finds an entity by API key.
    pub async fn entity_by_api_key(&self, api_key: &str) -> Option<Entity> {
        let entities = self.entities.read().await;
        entities
            .values()
            .find(|e| e.api_key.as_deref() == Some(api_key))
            .cloned()
    }

    /// Lists active entities, optionally filtered by type, ordered by id.
    pub async fn list_entities(&self, entity_type: Option<EntityType>) -> Vec<Entity> {
        let entities = self.entities.read().await;
        let mut out: Vec<Entity> = entities
            .values()
            .filter(|e| e.is_active)
            .filter(|e| entity_type.is_none_or(|t| e.entity_type == t))
            .cloned()
            .collect();
        out.sort_by_key(|e| e.id);
        out
    }

    // -----------------------------------------------------------------
    // Projects
    // -----------------------------------------------------------------

    /// Creates a project in `Pending` approval state.
    pub async fn create_project(
        &self,
        name: String,
        description: Option<String>,
        creator_id: EntityId,
    ) -> Project {
        let now = Utc::now();
        let project = Project {
            id: ProjectId(self.next_project_id.fetch_add(1, Ordering::Relaxed)),
            name,
            description,
            creator_id,
            approval_status: ApprovalStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        let mut projects = self.projects.write().await;
        projects.insert(project.id, project.clone());
        drop(projects);
        project
    }

    /// Looks up a project by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn get_project(&self, id: ProjectId) -> Result<Project, StoreError> {
        let projects = self.projects.read().await;
        projects
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound("project"))
    }

    /// Lists projects, newest first, optionally filtered by approval status.
    pub async fn list_projects(&self, approval_status: Option<ApprovalStatus>) -> Vec<Project> {
        let projects = self.projects.read().await;
        let mut out: Vec<Project> = projects
            .values()
            .filter(|p| approval_status.is_none_or(|s| p.approval_status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        out
    }

    /// Applies a partial update to a project, touching `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn update_project(
        &self,
        id: ProjectId,
        patch: ProjectPatch,
    ) -> Result<Project, StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects.get_mut(&id).ok_or(StoreError::NotFound("project"))?;
        if let Some(name) = patch.name {
            project.name = name;
        }
        if let Some(description) = patch.description {
            project.description = Some(description);
        }
        if let Some(status) = patch.approval_status {
            project.approval_status = status;
        }
        project.updated_at = Utc::now();
        Ok(project.clone())
    }

    /// Deletes a project, cascading to its stages, tasks, and their comments.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn delete_project(&self, id: ProjectId) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        projects.remove(&id).ok_or(StoreError::NotFound("project"))?;
        drop(projects);

        let mut stages = self.stages.write().await;
        stages.retain(|_, s| s.project_id != id);
        drop(stages);

        let removed: Vec<TaskId> = {
            let mut tasks = self.tasks.write().await;
            let doomed: Vec<TaskId> = tasks
                .values()
                .filter(|t| t.project_id == id)
                .map(|t| t.id)
                .collect();
            for task_id in &doomed {
                tasks.remove(task_id);
            }
            doomed
        };

        let mut comments = self.comments.write().await;
        comments.retain(|_, c| !removed.contains(&c.task_id));
        drop(comments);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Stages
    // -----------------------------------------------------------------

    /// Adds a stage to a project.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the project is absent.
    pub async fn create_stage(
        &self,
        project_id: ProjectId,
        name: String,
        description: Option<String>,
        order: i64,
    ) -> Result<Stage, StoreError> {
        self.get_project(project_id).await?;
        let stage = Stage {
            id: StageId(self.next_stage_id.fetch_add(1, Ordering::Relaxed)),
            project_id,
            name,
            description,
            order,
            created_at: Utc::now(),
        };
        let mut stages = self.stages.write().await;
        stages.insert(stage.id, stage.clone());
        drop(stages);
        Ok(stage)
    }

    /// Looks up a stage by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn get_stage(&self, id: StageId) -> Result<Stage, StoreError> {
        let stages = self.stages.read().await;
        stages.get(&id).cloned().ok_or(StoreError::NotFound("stage"))
    }

    /// Lists a project's stages in board order.
    pub async fn list_stages(&self, project_id: ProjectId) -> Vec<Stage> {
        let stages = self.stages.read().await;
        let mut out: Vec<Stage> = stages
            .values()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| (s.order, s.id));
        out
    }

    /// Applies a partial update to a stage.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn update_stage(&self, id: StageId, patch: StagePatch) -> Result<Stage, StoreError> {
        let mut stages = self.stages.write().await;
        let stage = stages.get_mut(&id).ok_or(StoreError::NotFound("stage"))?;
        if let Some(name) = patch.name {
            stage.name = name;
        }
        if let Some(description) = patch.description {
            stage.description = Some(description);
        }
        if let Some(order) = patch.order {
            stage.order = order;
        }
        Ok(stage.clone())
    }

    /// Deletes a stage. Tasks on the stage keep running with no column.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn delete_stage(&self, id: StageId) -> Result<Stage, StoreError> {
        let mut stages = self.stages.write().await;
        let stage = stages.remove(&id).ok_or(StoreError::NotFound("stage"))?;
        drop(stages);

        let mut tasks = self.tasks.write().await;
        for task in tasks.values_mut() {
            if task.stage_id == Some(id) {
                task.stage_id = None;
            }
        }
        drop(tasks);
        Ok(stage)
    }

    // -----------------------------------------------------------------
    // Tasks
    // -----------------------------------------------------------------

    /// Creates a task, validating project, stage, and parent references.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for missing references,
    /// [`StoreError::StageProjectMismatch`] or
    /// [`StoreError::ParentProjectMismatch`] for cross-project references.
    pub async fn create_task(&self, new: NewTask) -> Result<Task, StoreError> {
        self.get_project(new.project_id).await?;
        if let Some(stage_id) = new.stage_id {
            let stage = self.get_stage(stage_id).await?;
            if stage.project_id != new.project_id {
                return Err(StoreError::StageProjectMismatch);
            }
        }

        let mut tasks = self.tasks.write().await;
        if let Some(parent_id) = new.parent_task_id {
            let parent = tasks.get(&parent_id).ok_or(StoreError::NotFound("task"))?;
            if parent.project_id != new.project_id {
                return Err(StoreError::ParentProjectMismatch);
            }
        }
        let now = Utc::now();
        let task = Task {
            id: TaskId(self.next_task_id.fetch_add(1, Ordering::Relaxed)),
            title: new.title,
            description: new.description,
            status: TaskStatus::Pending,
            project_id: new.project_id,
            stage_id: new.stage_id,
            parent_task_id: new.parent_task_id,
            required_skills: new.required_skills,
            priority: new.priority,
            assignees: Vec::new(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        tasks.insert(task.id, task.clone());
        drop(tasks);
        Ok(task)
    }

    /// Looks up a task by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn get_task(&self, id: TaskId) -> Result<Task, StoreError> {
        let tasks = self.tasks.read().await;
        tasks.get(&id).cloned().ok_or(StoreError::NotFound("task"))
    }

    /// Lists tasks matching the filter, highest priority first, then newest.
    pub async fn list_tasks(&self, filter: TaskFilter) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| filter.project_id.is_none_or(|p| t.project_id == p))
            .filter(|t| filter.stage_id.is_none_or(|s| t.stage_id == Some(s)))
            .filter(|t| filter.status.is_none_or(|s| t.status == s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(b.created_at.cmp(&a.created_at))
                .then(b.id.cmp(&a.id))
        });
        out
    }

    /// Lists tasks still open for claiming (`Pending` or `InProgress`).
    pub async fn claimable_tasks(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::InProgress))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Lists direct subtasks of a task.
    pub async fn subtasks(&self, parent_id: TaskId) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| t.parent_task_id == Some(parent_id))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Runs a mutation against one task under the exclusive task-map lock.
    ///
    /// The closure sees the current task state and may modify it; the
    /// post-mutation snapshot is returned. Concurrent calls against the
    /// same task serialize here, so read-modify-write sequences (assignee
    /// updates, completion stamping) cannot lose updates.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task is absent, or any error
    /// the closure raises (in which case the task is left unmodified only
    /// if the closure did not touch it before failing).
    pub async fn mutate_task<F>(&self, id: TaskId, f: F) -> Result<Task, StoreError>
    where
        F: FnOnce(&mut Task) -> Result<(), StoreError>,
    {
        let mut tasks = self.tasks.write().await;
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound("task"))?;
        f(task)?;
        Ok(task.clone())
    }

    /// Moves a task under a new parent (or detaches it), rejecting cycles.
    ///
    /// The ancestor chain of the proposed parent is walked under the
    /// exclusive lock; if it reaches the task itself the move is rejected.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`], [`StoreError::ParentCycle`], or
    /// [`StoreError::ParentProjectMismatch`].
    pub async fn reparent_task(
        &self,
        id: TaskId,
        parent_id: Option<TaskId>,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        if !tasks.contains_key(&id) {
            return Err(StoreError::NotFound("task"));
        }
        if let Some(parent_id) = parent_id {
            let child_project = tasks[&id].project_id;
            let parent = tasks.get(&parent_id).ok_or(StoreError::NotFound("task"))?;
            if parent.project_id != child_project {
                return Err(StoreError::ParentProjectMismatch);
            }
            // Walk up from the proposed parent; hitting `id` means a cycle.
            let mut cursor = Some(parent_id);
            while let Some(current) = cursor {
                if current == id {
                    return Err(StoreError::ParentCycle);
                }
                cursor = tasks.get(&current).and_then(|t| t.parent_task_id);
            }
        }
        let task = tasks.get_mut(&id).ok_or(StoreError::NotFound("task"))?;
        task.parent_task_id = parent_id;
        task.updated_at = Utc::now();
        Ok(task.clone())
    }

    /// Deletes a task, detaching its subtasks and dropping its comments.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if absent.
    pub async fn delete_task(&self, id: TaskId) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks.remove(&id).ok_or(StoreError::NotFound("task"))?;
        for child in tasks.values_mut() {
            if child.parent_task_id == Some(id) {
                child.parent_task_id = None;
            }
        }
        drop(tasks);

        let mut comments = self.comments.write().await;
        comments.retain(|_, c| c.task_id != id);
        drop(comments);
        Ok(task)
    }

    // -----------------------------------------------------------------
    // Comments
    // -----------------------------------------------------------------

    /// Adds a comment to a task, returning it with the task's project.
    ///
    /// The task lock is held across the insert: a concurrent task deletion
    /// either runs before (this call fails) or after (the deletion sweeps
    /// the comment), so no orphan comment can be stranded and the returned
    /// project scope is the one the comment was created under.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if the task is absent.
    pub async fn create_comment(
        &self,
        task_id: TaskId,
        author_id: EntityId,
        content: String,
    ) -> Result<(Comment, ProjectId), StoreError> {
        let tasks = self.tasks.read().await;
        let project_id = tasks
            .get(&task_id)
            .map(|t| t.project_id)
            .ok_or(StoreError::NotFound("task"))?;
        let comment = Comment {
            id: CommentId(self.next_comment_id.fetch_add(1, Ordering::Relaxed)),
            task_id,
            author_id,
            content,
            created_at: Utc::now(),
        };
        let mut comments = self.comments.write().await;
        comments.insert(comment.id, comment.clone());
        drop(comments);
        drop(tasks);
        Ok((comment, project_id))
    }

    /// Lists a task's comments, oldest first.
    pub async fn list_comments(&self, task_id: TaskId) -> Vec<Comment> {
        let comments = self.comments.read().await;
        let mut out: Vec<Comment> = comments
            .values()
            .filter(|c| c.task_id == task_id)
            .cloned()
            .collect();
        out.sort_by_key(|c| (c.created_at, c.id));
        out
    }
}

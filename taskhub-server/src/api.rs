//! REST handlers for entities, auth, projects, stages, tasks, and comments.
//!
//! Every mutation goes through the store or the assignment ledger and then
//! pushes a notification envelope through the dispatcher; delivery is
//! best-effort and never affects the HTTP response. Authentication accepts
//! either a bearer token (humans, minted by `/auth/token`) or an
//! `X-API-Key` header (agents, minted at registration).

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use taskhub_proto::eligibility;
use taskhub_proto::entity::{Entity, EntityId, EntityType};
use taskhub_proto::project::{ApprovalStatus, Project, ProjectId, Stage, StageId, default_stages};
use taskhub_proto::skill::SkillSet;
use taskhub_proto::task::{Task, TaskId, TaskStatus};

use crate::auth;
use crate::error::ApiError;
use crate::ledger::TaskPatch;
use crate::notify;
use crate::server::AppState;
use crate::store::{NewEntity, NewTask, ProjectPatch, StagePatch, TaskFilter};

/// Resolves the calling entity from request headers.
///
/// `X-API-Key` wins when both credentials are present.
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Entity, ApiError> {
    if let Some(value) = headers.get("x-api-key") {
        let key = value.to_str().map_err(|_| ApiError::Unauthenticated)?;
        return state.auth.entity_for_api_key(&state.store, key).await;
    }
    let value = headers
        .get(AUTHORIZATION)
        .ok_or(ApiError::Unauthenticated)?
        .to_str()
        .map_err(|_| ApiError::Unauthenticated)?;
    let token = value
        .strip_prefix("Bearer ")
        .ok_or(ApiError::Unauthenticated)?;
    state.auth.entity_for_token(&state.store, token).await
}

fn require_non_empty(value: &str, what: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Liveness probe.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Entities and auth
// ---------------------------------------------------------------------------

/// Body for human registration.
#[derive(Debug, Deserialize)]
pub struct RegisterHumanRequest {
    /// Display name.
    pub name: String,
    /// Login email, unique across entities.
    pub email: String,
    /// Login password.
    pub password: String,
    /// Initial skill set.
    #[serde(default)]
    pub skills: SkillSet,
}

/// Body for agent registration.
#[derive(Debug, Deserialize)]
pub struct RegisterAgentRequest {
    /// Display name.
    pub name: String,
    /// Initial skill set.
    #[serde(default)]
    pub skills: SkillSet,
}

/// Body for `/auth/token`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Registered email.
    pub email: String,
    /// Password.
    pub password: String,
}

/// Query parameters for the entity listing.
#[derive(Debug, Default, Deserialize)]
pub struct EntityListQuery {
    /// Restrict to one entity type.
    pub entity_type: Option<EntityType>,
}

/// Registers a human entity.
pub async fn register_human(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterHumanRequest>,
) -> Result<Json<Entity>, ApiError> {
    require_non_empty(&body.name, "name")?;
    require_non_empty(&body.email, "email")?;
    require_non_empty(&body.password, "password")?;

    let entity = state
        .store
        .create_entity(NewEntity {
            name: body.name,
            entity_type: EntityType::Human,
            email: Some(body.email),
            api_key: None,
            password_hash: Some(auth::hash_password(&body.password)),
            skills: body.skills,
        })
        .await?;
    state
        .dispatcher
        .notify(notify::ENTITY_REGISTERED, json!({ "entity": entity }), None)
        .await;
    Ok(Json(entity))
}

/// Registers an agent entity.
///
/// The minted API key appears in this response and nowhere else; entity
/// serialization never includes credentials.
pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterAgentRequest>,
) -> Result<Json<Value>, ApiError> {
    require_non_empty(&body.name, "name")?;

    let api_key = auth::mint_api_key();
    let entity = state
        .store
        .create_entity(NewEntity {
            name: body.name,
            entity_type: EntityType::Agent,
            email: None,
            api_key: Some(api_key.clone()),
            password_hash: None,
            skills: body.skills,
        })
        .await?;
    state
        .dispatcher
        .notify(notify::ENTITY_REGISTERED, json!({ "entity": entity }), None)
        .await;
    Ok(Json(json!({ "entity": entity, "api_key": api_key })))
}

/// Exchanges email/password for a bearer token.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<Value>, ApiError> {
    let token = state
        .auth
        .login(&state.store, &body.email, &body.password)
        .await?;
    Ok(Json(json!({ "access_token": token, "token_type": "bearer" })))
}

/// Returns the calling entity.
pub async fn current_entity(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Entity>, ApiError> {
    let entity = authenticate(&state, &headers).await?;
    Ok(Json(entity))
}

/// Lists active entities, optionally filtered by type.
pub async fn list_entities(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<EntityListQuery>,
) -> Result<Json<Vec<Entity>>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.store.list_entities(query.entity_type).await))
}

// ---------------------------------------------------------------------------
// Projects
// ---------------------------------------------------------------------------

/// Body for project creation.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    /// Project name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
}

/// Body for project updates.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateProjectRequest {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New approval status.
    pub approval_status: Option<ApprovalStatus>,
}

/// Query parameters for the project listing.
#[derive(Debug, Default, Deserialize)]
pub struct ProjectListQuery {
    /// Restrict to one approval status.
    pub approval_status: Option<ApprovalStatus>,
}

/// A project together with its board and tasks, as returned by the
/// single-project fetch.
#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    /// The project record, flattened into the top level.
    #[serde(flatten)]
    pub project: Project,
    /// Stages in board order.
    pub stages: Vec<Stage>,
    /// Tasks, highest priority first.
    pub tasks: Vec<Task>,
}

/// Creates a project with the default board stages.
pub async fn create_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    let creator = authenticate(&state, &headers).await?;
    require_non_empty(&body.name, "name")?;

    let project = state
        .store
        .create_project(body.name, body.description, creator.id)
        .await;
    for (name, description, order) in default_stages() {
        state
            .store
            .create_stage(
                project.id,
                name.to_string(),
                Some(description.to_string()),
                order,
            )
            .await?;
    }
    state
        .dispatcher
        .notify(
            notify::PROJECT_CREATED,
            json!({ "project": project }),
            Some(project.id),
        )
        .await;
    Ok(Json(project))
}

/// Lists projects, newest first.
pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ProjectListQuery>,
) -> Result<Json<Vec<Project>>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.store.list_projects(query.approval_status).await))
}

/// Fetches one project with its stages and tasks.
pub async fn get_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<ProjectDetail>, ApiError> {
    authenticate(&state, &headers).await?;
    let project_id = ProjectId(id);
    let project = state.store.get_project(project_id).await?;
    let stages = state.store.list_stages(project_id).await;
    let tasks = state
        .store
        .list_tasks(TaskFilter {
            project_id: Some(project_id),
            ..TaskFilter::default()
        })
        .await;
    Ok(Json(ProjectDetail {
        project,
        stages,
        tasks,
    }))
}

/// Applies a partial update to a project.
pub async fn update_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<UpdateProjectRequest>,
) -> Result<Json<Project>, ApiError> {
    authenticate(&state, &headers).await?;
    let project = state
        .store
        .update_project(
            ProjectId(id),
            ProjectPatch {
                name: body.name,
                description: body.description,
                approval_status: body.approval_status,
            },
        )
        .await?;
    state
        .dispatcher
        .notify(
            notify::PROJECT_UPDATED,
            json!({ "project": project }),
            Some(project.id),
        )
        .await;
    Ok(Json(project))
}

/// Deletes a project and everything under it.
pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    let project_id = ProjectId(id);
    let project = state.store.get_project(project_id).await?;
    state.store.delete_project(project_id).await?;
    state
        .dispatcher
        .notify(
            notify::PROJECT_DELETED,
            json!({ "project": project }),
            Some(project_id),
        )
        .await;
    Ok(Json(json!({ "deleted": id })))
}

// ---------------------------------------------------------------------------
// Stages
// ---------------------------------------------------------------------------

/// Body for stage creation.
#[derive(Debug, Deserialize)]
pub struct CreateStageRequest {
    /// Stage name.
    pub name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Board position; higher is further right.
    pub order: i64,
}

/// Body for stage updates.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UpdateStageRequest {
    /// New name.
    pub name: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New board position.
    pub order: Option<i64>,
}

/// Adds a stage to a project's board.
pub async fn create_stage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<u64>,
    Json(body): Json<CreateStageRequest>,
) -> Result<Json<Stage>, ApiError> {
    authenticate(&state, &headers).await?;
    require_non_empty(&body.name, "name")?;
    let stage = state
        .store
        .create_stage(ProjectId(project_id), body.name, body.description, body.order)
        .await?;
    state
        .dispatcher
        .notify(
            notify::STAGE_CREATED,
            json!({ "stage": stage }),
            Some(stage.project_id),
        )
        .await;
    Ok(Json(stage))
}

/// Lists a project's stages in board order.
pub async fn list_stages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(project_id): Path<u64>,
) -> Result<Json<Vec<Stage>>, ApiError> {
    authenticate(&state, &headers).await?;
    let project_id = ProjectId(project_id);
    state.store.get_project(project_id).await?;
    Ok(Json(state.store.list_stages(project_id).await))
}

/// Applies a partial update to a stage.
pub async fn update_stage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<UpdateStageRequest>,
) -> Result<Json<Stage>, ApiError> {
    authenticate(&state, &headers).await?;
    let stage = state
        .store
        .update_stage(
            StageId(id),
            StagePatch {
                name: body.name,
                description: body.description,
                order: body.order,
            },
        )
        .await?;
    state
        .dispatcher
        .notify(
            notify::STAGE_UPDATED,
            json!({ "stage": stage }),
            Some(stage.project_id),
        )
        .await;
    Ok(Json(stage))
}

/// Removes a stage; tasks on it keep existing without a stage.
pub async fn delete_stage(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    let stage = state.store.delete_stage(StageId(id)).await?;
    state
        .dispatcher
        .notify(
            notify::STAGE_DELETED,
            json!({ "stage": stage }),
            Some(stage.project_id),
        )
        .await;
    Ok(Json(json!({ "deleted": id })))
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// Body for task creation.
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    /// Task title.
    pub title: String,
    /// Optional description.
    pub description: Option<String>,
    /// Owning project.
    pub project_id: u64,
    /// Optional board column.
    pub stage_id: Option<u64>,
    /// Optional parent task (same project).
    pub parent_task_id: Option<u64>,
    /// Skills a claimant should overlap with.
    #[serde(default)]
    pub required_skills: SkillSet,
    /// Higher is more urgent.
    #[serde(default)]
    pub priority: i64,
}

/// Query parameters for the task listing.
#[derive(Debug, Default, Deserialize)]
pub struct TaskListQuery {
    /// Restrict to one project.
    pub project_id: Option<u64>,
    /// Restrict to one board column.
    pub stage_id: Option<u64>,
    /// Restrict to one status.
    pub status: Option<TaskStatus>,
    /// Restrict to tasks the caller is assigned to.
    #[serde(default)]
    pub assigned_to_me: bool,
}

/// Body naming an entity to assign.
#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    /// The entity to add.
    pub entity_id: u64,
}

/// Creates a task.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateTaskRequest>,
) -> Result<Json<Task>, ApiError> {
    authenticate(&state, &headers).await?;
    require_non_empty(&body.title, "title")?;
    let (task, _) = state
        .ledger
        .create_task(NewTask {
            title: body.title,
            description: body.description,
            project_id: ProjectId(body.project_id),
            stage_id: body.stage_id.map(StageId),
            parent_task_id: body.parent_task_id.map(TaskId),
            required_skills: body.required_skills,
            priority: body.priority,
        })
        .await?;
    state
        .dispatcher
        .notify(
            notify::TASK_CREATED,
            json!({ "task": task }),
            Some(task.project_id),
        )
        .await;
    Ok(Json(task))
}

/// Lists tasks, highest priority first.
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<Vec<Task>>, ApiError> {
    let caller = authenticate(&state, &headers).await?;
    let mut tasks = state
        .store
        .list_tasks(TaskFilter {
            project_id: query.project_id.map(ProjectId),
            stage_id: query.stage_id.map(StageId),
            status: query.status,
        })
        .await;
    if query.assigned_to_me {
        tasks.retain(|t| t.is_assigned(caller.id));
    }
    Ok(Json(tasks))
}

/// Lists claimable tasks matching the caller's skills.
pub async fn available_tasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Vec<Task>>, ApiError> {
    let entity = authenticate(&state, &headers).await?;
    let claimable = state.store.claimable_tasks().await;
    Ok(Json(eligibility::available_tasks(&entity, claimable)))
}

/// Fetches one task.
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Task>, ApiError> {
    authenticate(&state, &headers).await?;
    Ok(Json(state.store.get_task(TaskId(id)).await?))
}

/// Lists a task's direct subtasks.
pub async fn list_subtasks(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Vec<Task>>, ApiError> {
    authenticate(&state, &headers).await?;
    let id = TaskId(id);
    state.store.get_task(id).await?;
    Ok(Json(state.store.subtasks(id).await))
}

/// Applies a partial update to a task.
pub async fn update_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, ApiError> {
    authenticate(&state, &headers).await?;
    let (task, _) = state.ledger.apply_update(TaskId(id), patch).await?;
    state
        .dispatcher
        .notify(
            notify::TASK_UPDATED,
            json!({ "task": task }),
            Some(task.project_id),
        )
        .await;
    Ok(Json(task))
}

/// Deletes a task; subtasks survive as top-level tasks.
pub async fn delete_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    authenticate(&state, &headers).await?;
    let (task, _) = state.ledger.delete_task(TaskId(id)).await?;
    state
        .dispatcher
        .notify(
            notify::TASK_DELETED,
            json!({ "task": task }),
            Some(task.project_id),
        )
        .await;
    Ok(Json(json!({ "deleted": id })))
}

/// Adds a named entity to a task's assignees.
pub async fn assign_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
    Json(body): Json<AssignRequest>,
) -> Result<Json<Task>, ApiError> {
    authenticate(&state, &headers).await?;
    let entity_id = EntityId(body.entity_id);
    let (task, _) = state.ledger.assign(TaskId(id), entity_id).await?;
    notify_assignment(&state, &task, notify::TASK_ASSIGNED, entity_id).await;
    Ok(Json(task))
}

/// The caller claims the task for itself.
pub async fn self_assign_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<Task>, ApiError> {
    let entity = authenticate(&state, &headers).await?;
    let (task, _) = state.ledger.self_assign(TaskId(id), entity.id).await?;
    notify_assignment(&state, &task, notify::TASK_ASSIGNED, entity.id).await;
    Ok(Json(task))
}

/// Removes an entity from a task's assignees.
pub async fn unassign_task(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((id, entity_id)): Path<(u64, u64)>,
) -> Result<Json<Task>, ApiError> {
    authenticate(&state, &headers).await?;
    let entity_id = EntityId(entity_id);
    let (task, _) = state.ledger.unassign(TaskId(id), entity_id).await?;
    notify_assignment(&state, &task, notify::TASK_UNASSIGNED, entity_id).await;
    Ok(Json(task))
}

async fn notify_assignment(state: &AppState, task: &Task, event_type: &str, entity_id: EntityId) {
    state
        .dispatcher
        .notify(
            event_type,
            json!({ "task": task, "entity_id": entity_id }),
            Some(task.project_id),
        )
        .await;
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

/// Body for comment creation.
#[derive(Debug, Deserialize)]
pub struct CreateCommentRequest {
    /// Task being commented on.
    pub task_id: u64,
    /// Comment text.
    pub content: String,
}

/// Adds a comment to a task, authored by the caller.
pub async fn create_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<CreateCommentRequest>,
) -> Result<Json<taskhub_proto::comment::Comment>, ApiError> {
    let author = authenticate(&state, &headers).await?;
    require_non_empty(&body.content, "content")?;
    let task_id = TaskId(body.task_id);
    let (comment, project_id) = state
        .store
        .create_comment(task_id, author.id, body.content)
        .await?;
    state
        .dispatcher
        .notify(
            notify::COMMENT_ADDED,
            json!({ "comment": comment }),
            Some(project_id),
        )
        .await;
    Ok(Json(comment))
}

/// Lists a task's comments, oldest first.
pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(task_id): Path<u64>,
) -> Result<Json<Vec<taskhub_proto::comment::Comment>>, ApiError> {
    authenticate(&state, &headers).await?;
    let task_id = TaskId(task_id);
    state.store.get_task(task_id).await?;
    Ok(Json(state.store.list_comments(task_id).await))
}

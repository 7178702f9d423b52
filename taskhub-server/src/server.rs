//! Server assembly: shared state, the router, and startup.

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};

use crate::auth::Authenticator;
use crate::ledger::AssignmentLedger;
use crate::notify::NotificationDispatcher;
use crate::registry::ConnectionRegistry;
use crate::store::Store;
use crate::{api, ws};

/// Shared application state handed to every handler.
pub struct AppState {
    /// Record storage.
    pub store: Arc<Store>,
    /// Live WebSocket handles.
    pub registry: Arc<ConnectionRegistry>,
    /// Envelope fan-out.
    pub dispatcher: NotificationDispatcher,
    /// Task/assignee mutations.
    pub ledger: AssignmentLedger,
    /// Credential resolution and sessions.
    pub auth: Authenticator,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    /// Creates fresh state with an empty store and no connections.
    #[must_use]
    pub fn new() -> Self {
        let store = Arc::new(Store::new());
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            dispatcher: NotificationDispatcher::new(Arc::clone(&registry)),
            ledger: AssignmentLedger::new(Arc::clone(&store)),
            auth: Authenticator::new(),
            store,
            registry,
        }
    }
}

/// Builds the full application router over the given state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/entities/register/human", post(api::register_human))
        .route("/entities/register/agent", post(api::register_agent))
        .route("/auth/token", post(api::login))
        .route("/entities/me", get(api::current_entity))
        .route("/entities", get(api::list_entities))
        .route("/projects", post(api::create_project).get(api::list_projects))
        .route(
            "/projects/{id}",
            get(api::get_project)
                .patch(api::update_project)
                .delete(api::delete_project),
        )
        .route(
            "/projects/{id}/stages",
            post(api::create_stage).get(api::list_stages),
        )
        .route(
            "/stages/{id}",
            patch(api::update_stage).delete(api::delete_stage),
        )
        .route("/tasks", post(api::create_task).get(api::list_tasks))
        .route("/tasks/available", get(api::available_tasks))
        .route(
            "/tasks/{id}",
            get(api::get_task)
                .patch(api::update_task)
                .delete(api::delete_task),
        )
        .route("/tasks/{id}/subtasks", get(api::list_subtasks))
        .route("/tasks/{id}/assign", post(api::assign_task))
        .route("/tasks/{id}/self-assign", post(api::self_assign_task))
        .route(
            "/tasks/{id}/unassign/{entity_id}",
            delete(api::unassign_task),
        )
        .route("/comments", post(api::create_comment))
        .route("/tasks/{id}/comments", get(api::list_comments))
        .route("/ws", get(ws::global_feed))
        .route("/ws/projects/{project_id}", get(ws::project_feed))
        .with_state(state)
}

/// Starts the server on the given address and returns the bound address
/// and a join handle.
///
/// This is the primary entry point used by both `main.rs` and test code;
/// bind to `127.0.0.1:0` for an OS-assigned port in tests.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>, Arc<AppState>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let state = Arc::new(AppState::new());
    let (bound_addr, handle) = start_server_with_state(addr, Arc::clone(&state)).await?;
    Ok((bound_addr, handle, state))
}

/// Starts the server with pre-built [`AppState`].
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_state(
    addr: &str,
    state: Arc<AppState>,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "server error");
        }
    });

    Ok((bound_addr, handle))
}

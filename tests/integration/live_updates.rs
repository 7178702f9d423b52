//! Live notification delivery over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite;
use tower::ServiceExt;

use taskhub_proto::event::{self, Envelope};
use taskhub_proto::project::ProjectId;

use taskhub_server::notify;
use taskhub_server::server::{self, AppState};

type WsClient =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn start_test_server() -> (std::net::SocketAddr, Arc<AppState>) {
    let (addr, _handle, state) = server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start test server");
    (addr, state)
}

/// Connects a client and consumes the `connected` greeting.
async fn connect(addr: std::net::SocketAddr, path: &str) -> WsClient {
    let url = format!("ws://{addr}{path}");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();
    let greeting = recv_envelope(&mut ws).await;
    assert_eq!(greeting.event_type(), notify::CONNECTED);
    ws
}

/// Receives the next text frame and decodes it, with a timeout.
async fn recv_envelope(ws: &mut WsClient) -> Envelope {
    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("websocket error");
    match msg {
        tungstenite::Message::Text(text) => event::decode(&text).unwrap(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

/// True if no frame arrives within a short window.
async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(result.is_err(), "expected no frame, got {result:?}");
}

/// Fires one REST request at an in-process router sharing the live
/// server's state, returning status and decoded JSON body.
async fn api_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    let request = match body {
        Some(value) => builder
            .header("content-type", "application/json")
            .body(Body::from(value.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed_project(state: &AppState, name: &str) -> ProjectId {
    let creator = state
        .store
        .create_entity(taskhub_server::store::NewEntity {
            name: "seed".to_string(),
            entity_type: taskhub_proto::entity::EntityType::Human,
            email: None,
            api_key: None,
            password_hash: None,
            skills: taskhub_proto::skill::SkillSet::new(),
        })
        .await
        .unwrap();
    state
        .store
        .create_project(name.to_string(), None, creator.id)
        .await
        .id
}

#[tokio::test]
async fn greeting_arrives_on_connect() {
    let (addr, _state) = start_test_server().await;
    let url = format!("ws://{addr}/ws");
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let greeting = recv_envelope(&mut ws).await;
    assert_eq!(greeting.event_type(), notify::CONNECTED);
    assert!(greeting.data()["connection_id"].is_string());
}

#[tokio::test]
async fn project_feed_rejects_unknown_project() {
    let (addr, _state) = start_test_server().await;
    let url = format!("ws://{addr}/ws/projects/999");
    let result = tokio_tungstenite::connect_async(&url).await;
    assert!(result.is_err(), "subscribing to a missing project must fail");
}

#[tokio::test]
async fn scoped_events_reach_only_their_project() {
    let (addr, state) = start_test_server().await;
    let website = seed_project(&state, "website").await;
    let pipeline = seed_project(&state, "pipeline").await;

    let mut ws_website = connect(addr, &format!("/ws/projects/{website}")).await;
    let mut ws_pipeline = connect(addr, &format!("/ws/projects/{pipeline}")).await;

    let sent = state
        .dispatcher
        .notify(notify::TASK_CREATED, json!({"task_id": 1}), Some(website))
        .await;

    let received = recv_envelope(&mut ws_website).await;
    assert_eq!(received, sent);
    assert_silent(&mut ws_pipeline).await;
}

#[tokio::test]
async fn global_subscriber_hears_scoped_and_unscoped_events() {
    let (addr, state) = start_test_server().await;
    let project = seed_project(&state, "website").await;

    let mut ws_global = connect(addr, "/ws").await;

    state
        .dispatcher
        .notify(notify::TASK_CREATED, json!({"task_id": 1}), Some(project))
        .await;
    let scoped = recv_envelope(&mut ws_global).await;
    assert_eq!(scoped.event_type(), notify::TASK_CREATED);
    assert_eq!(scoped.project_id(), Some(project));

    state
        .dispatcher
        .notify(notify::ENTITY_REGISTERED, json!({"entity_id": 2}), None)
        .await;
    let global = recv_envelope(&mut ws_global).await;
    assert_eq!(global.event_type(), notify::ENTITY_REGISTERED);
    assert_eq!(global.project_id(), None);
}

#[tokio::test]
async fn project_subscriber_receives_scoped_events_once() {
    let (addr, state) = start_test_server().await;
    let project = seed_project(&state, "website").await;

    let mut ws = connect(addr, &format!("/ws/projects/{project}")).await;

    state
        .dispatcher
        .notify(notify::TASK_UPDATED, json!({"task_id": 1}), Some(project))
        .await;

    let first = recv_envelope(&mut ws).await;
    assert_eq!(first.event_type(), notify::TASK_UPDATED);
    // A subscriber in both the project and global views still gets one copy.
    assert_silent(&mut ws).await;
}

#[tokio::test]
async fn text_frames_are_echoed() {
    let (addr, _state) = start_test_server().await;
    let mut ws = connect(addr, "/ws").await;

    ws.send(tungstenite::Message::Text("ping".into()))
        .await
        .unwrap();

    let echo = recv_envelope(&mut ws).await;
    assert_eq!(echo.event_type(), notify::ECHO);
    assert_eq!(echo.data()["message"], "ping");
}

#[tokio::test]
async fn dropped_subscriber_does_not_block_delivery() {
    let (addr, state) = start_test_server().await;
    let project = seed_project(&state, "website").await;

    let ws_dropped = connect(addr, &format!("/ws/projects/{project}")).await;
    let mut ws_live = connect(addr, &format!("/ws/projects/{project}")).await;
    drop(ws_dropped);

    // Give the server a moment to observe the closed socket.
    tokio::time::sleep(Duration::from_millis(100)).await;

    let sent = state
        .dispatcher
        .notify(notify::TASK_ASSIGNED, json!({"task_id": 7}), Some(project))
        .await;

    let received = recv_envelope(&mut ws_live).await;
    assert_eq!(received, sent);
}

#[tokio::test]
async fn disconnect_cleans_up_registry() {
    let (addr, state) = start_test_server().await;
    let project = seed_project(&state, "website").await;

    let ws = connect(addr, &format!("/ws/projects/{project}")).await;
    assert_eq!(state.registry.project_subscriber_count(project).await, 1);

    drop(ws);
    // Wait for the reader task to notice the close.
    for _ in 0..50 {
        if state.registry.connection_count().await == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state.registry.connection_count().await, 0);
    assert!(!state.registry.has_project_entry(project).await);
}

#[tokio::test]
async fn rest_mutations_reach_subscribed_sockets() {
    let (addr, state) = start_test_server().await;
    let app = server::router(Arc::clone(&state));

    // Register an agent; the API key appears only in this response.
    let (status, body) = api_request(
        &app,
        "POST",
        "/entities/register/agent",
        None,
        Some(json!({"name": "deploy-bot", "skills": ["rust"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let api_key = body["api_key"].as_str().unwrap().to_string();
    let agent_id = body["entity"]["id"].as_u64().unwrap();

    let (status, project) = api_request(
        &app,
        "POST",
        "/projects",
        Some(&api_key),
        Some(json!({"name": "website"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let project_id = project["id"].as_u64().unwrap();

    // Subscribe before mutating.
    let mut ws = connect(addr, &format!("/ws/projects/{project_id}")).await;

    let (status, task) = api_request(
        &app,
        "POST",
        "/tasks",
        Some(&api_key),
        Some(json!({"title": "build", "project_id": project_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let task_id = task["id"].as_u64().unwrap();

    let created = recv_envelope(&mut ws).await;
    assert_eq!(created.event_type(), notify::TASK_CREATED);
    assert_eq!(created.data()["task"]["id"].as_u64(), Some(task_id));

    let (status, assigned) = api_request(
        &app,
        "POST",
        &format!("/tasks/{task_id}/self-assign"),
        Some(&api_key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(assigned["assignees"], json!([agent_id]));

    let envelope = recv_envelope(&mut ws).await;
    assert_eq!(envelope.event_type(), notify::TASK_ASSIGNED);
    assert_eq!(envelope.project_id(), Some(ProjectId(project_id)));
    assert_eq!(envelope.data()["entity_id"].as_u64(), Some(agent_id));
}

#[tokio::test]
async fn requests_without_credentials_are_rejected() {
    let (_addr, state) = start_test_server().await;
    let app = server::router(Arc::clone(&state));

    let (status, body) = api_request(&app, "GET", "/tasks", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["detail"], "could not validate credentials");

    let (status, _) = api_request(&app, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn shutdown_sends_close_frames() {
    let (addr, state) = start_test_server().await;
    let mut ws = connect(addr, "/ws").await;

    state.registry.shutdown().await;

    let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("websocket error");
    assert!(matches!(msg, tungstenite::Message::Close(_)));
}

//! Connection registry for live-update subscribers.
//!
//! Tracks every open WebSocket connection. Each connection is always a
//! member of the global set and may additionally hold exactly one project
//! subscription. The registry exclusively owns the connection handles; the
//! rest of the server only ever sees [`ConnectionId`]s.
//!
//! The registry is an explicitly constructed instance shared through server
//! state, created at service start and shut down at service stop. One lock
//! guards both the subscriber map and the per-project index, so the
//! invariant "project membership implies global membership" can never be
//! observed broken.
//!
//! Broadcasts snapshot their audience before iterating: a connection that
//! joins or leaves mid-broadcast is neither skipped, double-sent, nor able
//! to corrupt iteration. A send failure on one handle disconnects only that
//! handle and never aborts delivery to the rest.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

use taskhub_proto::event::{self, Envelope};
use taskhub_proto::project::ProjectId;

/// Opaque handle identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One live subscriber: its outbound channel and optional project scope.
struct Subscriber {
    sender: mpsc::UnboundedSender<Message>,
    project: Option<ProjectId>,
}

#[derive(Default)]
struct RegistryInner {
    subscribers: HashMap<ConnectionId, Subscriber>,
    by_project: HashMap<ProjectId, HashSet<ConnectionId>>,
}

/// Registry of live subscriber connections, global and per-project.
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    next_id: AtomicU64,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Registers an opened connection, returning its handle.
    ///
    /// The connection joins the global set; with a `project` scope it also
    /// joins that project's subscriber set (created lazily).
    pub async fn connect(
        &self,
        sender: mpsc::UnboundedSender<Message>,
        project: Option<ProjectId>,
    ) -> ConnectionId {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut inner = self.inner.write().await;
        inner.subscribers.insert(id, Subscriber { sender, project });
        if let Some(project_id) = project {
            inner.by_project.entry(project_id).or_default().insert(id);
        }
        drop(inner);
        tracing::debug!(connection = %id, project = ?project, "connection registered");
        id
    }

    /// Removes a connection from every set it belongs to.
    ///
    /// Idempotent: disconnecting an already-closed handle is a no-op, so
    /// whichever concurrent path detects a dead connection first wins and
    /// later calls do nothing. A project subscriber set left empty by the
    /// removal is deleted outright.
    pub async fn disconnect(&self, id: ConnectionId) {
        let mut inner = self.inner.write().await;
        let Some(subscriber) = inner.subscribers.remove(&id) else {
            return;
        };
        if let Some(project_id) = subscriber.project
            && let Some(set) = inner.by_project.get_mut(&project_id)
        {
            set.remove(&id);
            if set.is_empty() {
                inner.by_project.remove(&project_id);
            }
        }
        drop(inner);
        tracing::debug!(connection = %id, "connection closed");
    }

    /// Delivers an envelope to a single connection.
    ///
    /// A failed send means the connection is already gone: the handle is
    /// disconnected as cleanup and the failure is not propagated.
    pub async fn send_to(&self, id: ConnectionId, envelope: &Envelope) {
        let Some(message) = encode_message(envelope) else {
            return;
        };
        let sender = {
            let inner = self.inner.read().await;
            inner.subscribers.get(&id).map(|s| s.sender.clone())
        };
        if let Some(sender) = sender
            && sender.send(message).is_err()
        {
            tracing::warn!(connection = %id, "send failed, dropping connection");
            self.disconnect(id).await;
        }
    }

    /// Delivers an envelope to every subscriber of a project.
    ///
    /// An unknown project id is a silent no-op. Failed handles are
    /// disconnected after the sweep; each delivery is attempted
    /// independently.
    pub async fn broadcast_to_project(&self, project_id: ProjectId, envelope: &Envelope) {
        let audience = {
            let inner = self.inner.read().await;
            inner.by_project.get(&project_id).map_or_else(Vec::new, |set| {
                set.iter()
                    .filter_map(|id| {
                        inner.subscribers.get(id).map(|s| (*id, s.sender.clone()))
                    })
                    .collect()
            })
        };
        self.deliver(audience, envelope).await;
    }

    /// Delivers an envelope to every open connection.
    pub async fn broadcast_to_all(&self, envelope: &Envelope) {
        let audience = {
            let inner = self.inner.read().await;
            inner
                .subscribers
                .iter()
                .map(|(id, s)| (*id, s.sender.clone()))
                .collect::<Vec<_>>()
        };
        self.deliver(audience, envelope).await;
    }

    /// Delivers an event to its natural audience.
    ///
    /// Scoped events reach the project's subscribers plus every unscoped
    /// (global-only) connection, each handle at most once. Unscoped events
    /// reach everyone.
    pub async fn broadcast(&self, envelope: &Envelope) {
        let Some(project_id) = envelope.project_id() else {
            self.broadcast_to_all(envelope).await;
            return;
        };
        let audience = {
            let inner = self.inner.read().await;
            inner
                .subscribers
                .iter()
                .filter(|(_, s)| s.project.is_none() || s.project == Some(project_id))
                .map(|(id, s)| (*id, s.sender.clone()))
                .collect::<Vec<_>>()
        };
        self.deliver(audience, envelope).await;
    }

    /// Sends to a snapshot audience, disconnecting every failed handle.
    async fn deliver(&self, audience: Vec<(ConnectionId, mpsc::UnboundedSender<Message>)>, envelope: &Envelope) {
        let Some(message) = encode_message(envelope) else {
            return;
        };
        let mut failed = Vec::new();
        for (id, sender) in audience {
            if sender.send(message.clone()).is_err() {
                tracing::warn!(connection = %id, "broadcast send failed");
                failed.push(id);
            }
        }
        for id in failed {
            self.disconnect(id).await;
        }
    }

    /// Number of open connections.
    pub async fn connection_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.subscribers.len()
    }

    /// Number of subscribers for one project (0 for unknown projects).
    pub async fn project_subscriber_count(&self, project_id: ProjectId) -> usize {
        let inner = self.inner.read().await;
        inner.by_project.get(&project_id).map_or(0, HashSet::len)
    }

    /// True if the project has an entry in the per-project index.
    pub async fn has_project_entry(&self, project_id: ProjectId) -> bool {
        let inner = self.inner.read().await;
        inner.by_project.contains_key(&project_id)
    }

    /// Sends a close frame to every open connection.
    ///
    /// Used at service stop so subscriber loops wind down promptly.
    pub async fn shutdown(&self) {
        let inner = self.inner.read().await;
        for (id, subscriber) in &inner.subscribers {
            tracing::info!(connection = %id, "sending close frame");
            let _ = subscriber.sender.send(Message::Close(None));
        }
    }
}

/// Encodes an envelope into a WebSocket text frame.
fn encode_message(envelope: &Envelope) -> Option<Message> {
    match event::encode(envelope) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode envelope");
            None
        }
    }
}

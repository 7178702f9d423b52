//! Notification envelopes pushed over live-update connections.
//!
//! Every event a client receives has the same JSON shape:
//!
//! ```json
//! {
//!   "event_type": "task_assigned",
//!   "timestamp": "2026-08-30T12:00:09Z",
//!   "project_id": 7,
//!   "data": { "task": { "...": "..." } }
//! }
//! ```
//!
//! `data` is always a JSON object, never a bare scalar. An envelope is
//! immutable once constructed; the timestamp is captured at construction
//! time in UTC.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::project::ProjectId;

/// A single pushed notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    event_type: String,
    timestamp: DateTime<Utc>,
    project_id: Option<ProjectId>,
    data: Value,
}

impl Envelope {
    /// Builds an envelope, capturing the current UTC time.
    ///
    /// The caller is responsible for `data` being a JSON object; event
    /// producers construct it with `serde_json::json!({ ... })`.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value, project_id: Option<ProjectId>) -> Self {
        Self {
            event_type: event_type.into(),
            timestamp: Utc::now(),
            project_id,
            data,
        }
    }

    /// Event-type tag, e.g. `task_assigned`.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// When the envelope was constructed (UTC).
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Project scope, if the event concerns a single project.
    #[must_use]
    pub const fn project_id(&self) -> Option<ProjectId> {
        self.project_id
    }

    /// Structured payload.
    #[must_use]
    pub const fn data(&self) -> &Value {
        &self.data
    }
}

/// Encodes an envelope into its JSON wire form.
///
/// # Errors
///
/// Returns an error string if serialization fails.
pub fn encode(envelope: &Envelope) -> Result<String, String> {
    serde_json::to_string(envelope).map_err(|e| format!("envelope encode error: {e}"))
}

/// Decodes an envelope from its JSON wire form.
///
/// # Errors
///
/// Returns an error string if the text is not a valid envelope.
pub fn decode(text: &str) -> Result<Envelope, String> {
    serde_json::from_str(text).map_err(|e| format!("envelope decode error: {e}"))
}

//! Error taxonomy for API operations.
//!
//! Errors surfaced to REST callers map onto HTTP statuses with a JSON
//! `{"detail": ...}` body. Transport-level delivery failures never appear
//! here; the connection registry recovers from those locally by dropping
//! the failing handle.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Errors returned by API operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// A referenced task, entity, project, stage, or comment is absent.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Credentials missing, malformed, or not recognized.
    #[error("could not validate credentials")]
    Unauthenticated,

    /// The authenticated entity has been deactivated.
    #[error("inactive entity")]
    Inactive,

    /// The request is structurally valid but violates a domain rule.
    #[error("{0}")]
    Validation(String),

    /// The request conflicts with existing state (e.g. duplicate email).
    #[error("{0}")]
    Conflict(String),
}

impl ApiError {
    /// HTTP status this error maps onto.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Inactive | Self::Validation(_) | Self::Conflict(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "detail": self.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(ApiError::NotFound("task").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthenticated.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Inactive.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Validation("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_message_names_the_kind() {
        assert_eq!(ApiError::NotFound("task").to_string(), "task not found");
        assert_eq!(ApiError::NotFound("entity").to_string(), "entity not found");
    }
}

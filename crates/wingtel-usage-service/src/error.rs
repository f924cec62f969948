//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use wingtel_usage_core::UsageError;
use wingtel_usage_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - malformed input not tied to one field.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// A request field failed validation.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The offending field.
        field: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A row lock could not be acquired in time; the request can be retried.
    #[error("busy: {0}")]
    Busy(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                "validation_error",
                message.clone(),
                Some(serde_json::json!({ "field": field })),
            ),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::Busy(msg) => {
                tracing::warn!(error = %msg, "Request gave up waiting for a row lock");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "busy",
                    "The aggregate is busy, retry the request".to_string(),
                    None,
                )
            }
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<UsageError> for ApiError {
    fn from(err: UsageError) -> Self {
        match err {
            UsageError::Validation { field, message } => Self::Validation { field, message },
            UsageError::InvalidId(e) => Self::BadRequest(e.to_string()),
            UsageError::Integrity(msg) => Self::Internal(format!("aggregate integrity: {msg}")),
            UsageError::Storage(msg) => Self::Internal(msg),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(format!("store task failed: {err}"))
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::DuplicateRecord { id } => {
                Self::Conflict(format!("Record {id} already exists"))
            }
            StoreError::Contention(msg) => Self::Busy(msg),
            StoreError::Usage(inner) => inner.into(),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request_with_field() {
        let err: ApiError = UsageError::validation("price_limit", "must be positive").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn store_errors_map_to_statuses() {
        let cases = [
            (
                StoreError::NotFound {
                    entity: "usage record",
                    id: "x".into(),
                },
                StatusCode::NOT_FOUND,
            ),
            (
                StoreError::DuplicateRecord { id: "x".into() },
                StatusCode::CONFLICT,
            ),
            (
                StoreError::Contention("timed out".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                StoreError::Usage(UsageError::Integrity("negative".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }
}

//! Error types for the HTTP bridge.
//!
//! [`ApiError`] unifies all failure modes into a single enum that can be
//! converted into an Axum HTTP response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use citadel_core::{ErrorKind, ServiceError};

/// Errors that can occur in the HTTP bridge.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The claim service rejected or failed the request.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A UUID could not be parsed from the request path or query.
    #[error("invalid UUID: {0}")]
    InvalidUuid(String),
}

impl ApiError {
    /// The HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthorized => StatusCode::FORBIDDEN,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidUuid(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "Request failed");
        }

        let body = serde_json::json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use citadel_types::{ClaimId, DenyReason};

    use super::*;

    #[test]
    fn service_kinds_map_to_statuses() {
        let cases = [
            (
                ApiError::from(ServiceError::Validation(String::from("bad"))),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(ServiceError::ClaimNotFound(ClaimId::new())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::from(ServiceError::Denied(DenyReason::NotAuthorized)),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::from(ServiceError::Overlap(ClaimId::new())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(ServiceError::Denied(DenyReason::RegistryUnavailable)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                ApiError::InvalidUuid(String::from("nope")),
                StatusCode::BAD_REQUEST,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.status(), status, "{err}");
        }
    }
}

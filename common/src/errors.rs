//! Application error taxonomy.
//!
//! All services share a single error enum so that HTTP status mapping and
//! response formatting stay consistent across the workspace.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::response::ApiResponse;

/// Result alias used throughout the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Unbind or lookup of a relation id that is not currently registered.
    #[error("unknown relation: {0}")]
    UnknownRelation(String),

    /// Backend endpoints are unreachable.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Credentials are invalid or have been revoked.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Requested data (table, collection or record) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A freshly issued credential collides with a previously issued one.
    /// Internal invariant violation; must never surface in normal operation.
    #[error("duplicate credential issued for database {0}")]
    DuplicateCredential(String),

    /// Request validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// Backend type not supported by the requested operation.
    #[error("unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Backend query failed for a reason other than auth or connectivity.
    #[error("database query failed: {0}")]
    DatabaseQuery(String),

    /// An external collaborator misbehaved.
    #[error("external service error: {0}")]
    ExternalService(String),
}

impl AppError {
    /// Machine-readable error code for the API envelope.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::UnknownRelation(_) => "UNKNOWN_RELATION",
            AppError::ConnectionFailed(_) => "CONNECTION_ERROR",
            AppError::AuthenticationFailed(_) => "AUTHENTICATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::DuplicateCredential(_) => "DUPLICATE_CREDENTIAL",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::UnsupportedBackend(_) => "UNSUPPORTED_BACKEND",
            AppError::DatabaseQuery(_) => "DATABASE_QUERY_ERROR",
            AppError::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
        }
    }

    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::UnknownRelation(_) | AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConnectionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) | AppError::UnsupportedBackend(_) => StatusCode::BAD_REQUEST,
            AppError::DuplicateCredential(_)
            | AppError::DatabaseQuery(_)
            | AppError::ExternalService(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "request rejected");
        }
        let body = ApiResponse::err(self.code(), self.to_string());
        (status, Json(body)).into_response()
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(e: validator::ValidationErrors) -> Self {
        AppError::Validation(e.to_string())
    }
}

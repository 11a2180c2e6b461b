//! Error types for cinekami-rs.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Application result type.
pub type AppResult<T> = Result<T, AppError>;

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    // === Client Errors ===
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Movie not found: {0}")]
    MovieNotFound(i64),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Voting closed")]
    VotingClosed,

    // === Server Errors ===
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            // 4xx Client Errors
            Self::InvalidCursor(_)
            | Self::InvalidFilter(_)
            | Self::InvalidCategory(_)
            | Self::BadRequest(_)
            | Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::MovieNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::VotingClosed => StatusCode::FORBIDDEN,

            // 5xx Server Errors
            Self::StorageUnavailable(_)
            | Self::Config(_)
            | Self::ExternalService(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidCursor(_) => "INVALID_CURSOR",
            Self::InvalidFilter(_) => "INVALID_FILTER",
            Self::InvalidCategory(_) => "INVALID_CATEGORY",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::MovieNotFound(_) => "MOVIE_NOT_FOUND",
            Self::NotFound(_) => "NOT_FOUND",
            Self::VotingClosed => "VOTING_CLOSED",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService(_) => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();

        if self.is_server_error() {
            tracing::error!(error = %self, code = code, "Server error occurred");
        } else {
            tracing::debug!(error = %self, code = code, "Client error occurred");
        }

        let body = Json(json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

// === From implementations ===

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<fred::error::Error> for AppError {
    fn from(err: fred::error::Error) -> Self {
        Self::StorageUnavailable(format!("cache: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_map_to_4xx() {
        assert_eq!(
            AppError::InvalidCursor("signature mismatch".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::InvalidFilter("min > max".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AppError::MovieNotFound(42).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::VotingClosed.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_storage_errors_are_server_errors() {
        let err = AppError::StorageUnavailable("connection refused".into());
        assert!(err.is_server_error());
        assert_eq!(err.error_code(), "STORAGE_UNAVAILABLE");
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(AppError::MovieNotFound(7).to_string(), "Movie not found: 7");
        assert_eq!(AppError::VotingClosed.to_string(), "Voting closed");
    }
}

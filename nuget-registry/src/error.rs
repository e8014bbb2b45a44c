//! # Error Handling and Response Types
//!
//! This module provides the closed error taxonomy of the registry. Every
//! failure raised by the extractors, the repository or the orchestrators is
//! funnelled into [`AppError`], and callers match on its kind rather than on
//! error identity.
//!
//! ## Key Types
//!
//! - [`AppError`]: Main error enum covering all possible application errors
//! - [`ApiErrorResponse`]: JSON error body returned to NuGet clients
//! - [`ErrorCode`]: Machine-readable error classification
//! - [`AppResult<T>`]: Convenience type alias for Results using `AppError`
//!
//! ## Error Response Format
//!
//! NuGet clients expect a single message field:
//!
//! ```json
//! { "Message": "package version already exists" }
//! ```
//!
//! ## Error Classifications
//!
//! - **Malformed input** (400 Bad Request): bad manifest, type mismatch, filename mismatch
//! - **Not Found** (404 Not Found): missing package, version, file or symbol
//! - **Conflict** (409 Conflict): duplicate version or file
//! - **Upload too large** (413 Payload Too Large): staging buffer ceiling exceeded
//! - **Internal Errors** (500 Internal Server Error): storage or I/O failures

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::nuget::ExtractError;
use crate::repository::RepositoryError;
use crate::validation::ValidationError;

/// Error body understood by NuGet clients.
#[derive(Serialize, Debug)]
pub struct ApiErrorResponse {
    #[serde(rename = "Message")]
    pub message: String,
}

/// Error code classification for machine-readable error types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    MalformedInput,
    NotFound,
    Conflict,
    TooLarge,
    StorageFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MalformedInput => "malformed_input",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::TooLarge => "too_large",
            ErrorCode::StorageFailure => "storage_failure",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::MalformedInput => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Application-specific error types with error codes
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Multipart form parsing error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Request body error: {0}")]
    Body(#[from] axum::Error),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl AppError {
    /// Get the appropriate error code for this error type
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::BadRequest(_) | AppError::Multipart(_) | AppError::Body(_) => {
                ErrorCode::MalformedInput
            }
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::PayloadTooLarge(_) => ErrorCode::TooLarge,
            AppError::InternalError(_) | AppError::Io(_) | AppError::Json(_) => {
                ErrorCode::StorageFailure
            }
        }
    }

    /// Create the client-facing error body
    pub fn to_error_response(&self) -> ApiErrorResponse {
        ApiErrorResponse {
            message: self.to_string(),
        }
    }
}

impl From<ExtractError> for AppError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::Io(e) => AppError::Io(e),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::PackageNotFound
            | RepositoryError::VersionNotFound
            | RepositoryError::FileNotFound => AppError::NotFound(err.to_string()),
            RepositoryError::DuplicateVersion | RepositoryError::DuplicateFile => {
                AppError::Conflict(err.to_string())
            }
            RepositoryError::Io(e) => AppError::Io(e),
            RepositoryError::Json(e) => AppError::Json(e),
            RepositoryError::Storage(msg) => AppError::InternalError(msg),
        }
    }
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::BadRequest(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.http_status();

        if code == ErrorCode::StorageFailure {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, code = code.as_str(), "Request rejected");
        }

        tracing::debug!(status = %status, code = code.as_str(), "Returning error response");

        (status, axum::Json(self.to_error_response())).into_response()
    }
}

/// Convenient result type for application operations.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PackageKind;

    #[test]
    fn test_repository_errors_map_to_kinds() {
        let conflict: AppError = RepositoryError::DuplicateVersion.into();
        assert_eq!(conflict.error_code(), ErrorCode::Conflict);
        assert_eq!(conflict.error_code().http_status(), StatusCode::CONFLICT);

        let missing: AppError = RepositoryError::VersionNotFound.into();
        assert_eq!(missing.error_code(), ErrorCode::NotFound);

        let storage: AppError = RepositoryError::Storage("disk full".to_string()).into();
        assert_eq!(
            storage.error_code().http_status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_extract_errors_are_client_errors() {
        let err: AppError = ExtractError::MissingManifest.into();
        assert_eq!(err.error_code(), ErrorCode::MalformedInput);

        let err: AppError = ExtractError::UnexpectedPackageType {
            expected: PackageKind::Dependency,
            actual: PackageKind::Symbols,
        }
        .into();
        assert_eq!(err.error_code().http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_error_body_uses_message_field() {
        let body = AppError::NotFound("package not found".to_string()).to_error_response();
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json, serde_json::json!({ "Message": "package not found" }));
    }
}

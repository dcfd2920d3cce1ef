//! API Error Types
//!
//! Maps store and write errors onto HTTP status codes with a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::storage::PathError;
use crate::store::{StoreError, WriteError};

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request validation failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Path names no namespace node
    #[error("Not found: {0}")]
    NotFound(String),

    /// Sample value incompatible with its declared type
    #[error("{0}")]
    TypeMismatch(String),

    /// Malformed key path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Backing medium unavailable; retryable
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::TypeMismatch(_) => (StatusCode::BAD_REQUEST, "TYPE_MISMATCH"),
            ApiError::InvalidPath(_) => (StatusCode::BAD_REQUEST, "INVALID_PATH"),
            ApiError::ServiceUnavailable(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "STORE_UNAVAILABLE")
            }
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            ApiError::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(path) => ApiError::NotFound(format!("key '{}'", path)),
            StoreError::StoreUnavailable(_) => ApiError::ServiceUnavailable(e.to_string()),
            StoreError::InvalidPath(e) => ApiError::InvalidPath(e.to_string()),
            StoreError::Write(e) => e.into(),
        }
    }
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::TypeMismatch { .. } => ApiError::TypeMismatch(e.to_string()),
            WriteError::StoreUnavailable(_) => ApiError::ServiceUnavailable(e.to_string()),
            WriteError::InvalidPath(msg) => ApiError::InvalidPath(msg),
        }
    }
}

impl From<PathError> for ApiError {
    fn from(e: PathError) -> Self {
        ApiError::InvalidPath(e.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    pub request_id: String,
}

/// Error details
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let request_id = uuid::Uuid::new_v4().to_string();

        if status.is_server_error() {
            tracing::error!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "API error occurred"
            );
        } else {
            tracing::debug!(
                request_id = %request_id,
                error_code = %code,
                error_message = %self,
                "Request rejected"
            );
        }

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: self.to_string(),
            },
            request_id,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{KeyPath, StorageError, ValueType};

    #[test]
    fn test_store_error_mapping() {
        let not_found: ApiError = StoreError::NotFound(KeyPath::parse("a").unwrap()).into();
        assert_eq!(not_found.status_and_code().0, StatusCode::NOT_FOUND);

        let unavailable: ApiError =
            StoreError::StoreUnavailable(StorageError::Unavailable("down".into())).into();
        assert_eq!(unavailable.status_and_code().0, StatusCode::SERVICE_UNAVAILABLE);

        let mismatch: ApiError = WriteError::TypeMismatch {
            index: 0,
            key: "k".into(),
            expected: ValueType::Boolean,
            actual: ValueType::String,
        }
        .into();
        assert_eq!(mismatch.status_and_code(), (StatusCode::BAD_REQUEST, "TYPE_MISMATCH"));

        let invalid: ApiError = KeyPath::parse("a..b").unwrap_err().into();
        assert_eq!(invalid.status_and_code().1, "INVALID_PATH");
    }
}

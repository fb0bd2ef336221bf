use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::integrity::ValidationError;
use crate::storage::{ImportError, StorageWriteFailure};

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// A submitted document failed schema validation.
    #[error("Document failed validation with {} error(s)", .0.len())]
    InvalidDocument(Vec<ValidationError>),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageWriteFailure),

    #[error("Import error: {0}")]
    Import(#[from] ImportError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone(), None),
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), None)
            }
            AppError::InvalidDocument(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_DOCUMENT",
                self.to_string(),
                Some(json!(errors)),
            ),
            AppError::Import(ImportError::Invalid(errors)) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_BACKUP",
                self.to_string(),
                Some(json!(errors)),
            ),
            AppError::Import(ImportError::Store(msg)) => {
                tracing::error!("Import store error: {msg}");
                (
                    StatusCode::INSUFFICIENT_STORAGE,
                    "STORAGE_ERROR",
                    "The imported document could not be stored".to_string(),
                    None,
                )
            }
            AppError::Import(e) => (StatusCode::BAD_REQUEST, "INVALID_BACKUP", e.to_string(), None),
            AppError::Storage(e) => {
                tracing::error!("Storage error: {e}");
                (
                    StatusCode::INSUFFICIENT_STORAGE,
                    "STORAGE_ERROR",
                    "The document could not be stored; the previous version was kept".to_string(),
                    None,
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                    None,
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(details) = details {
            error["details"] = details;
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

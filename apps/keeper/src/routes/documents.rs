use anyhow::Context;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::AppError;
use crate::integrity::Validation;
use crate::models::document::ResumeDocument;
use crate::state::AppState;
use crate::storage::{BackupPayload, LoadedDocument, Snapshot};

#[derive(Debug, Default, Deserialize)]
pub struct RestoreRequest {
    /// Exact snapshot timestamp; the latest snapshot when absent.
    pub timestamp: Option<DateTime<Utc>>,
}

/// GET /api/v1/documents/:key
pub async fn handle_get_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<LoadedDocument>, AppError> {
    let loaded = state
        .gateway
        .read_or_default(&key)
        .await
        .with_context(|| format!("Failed to read document '{key}'"))?;
    Ok(Json(loaded))
}

/// PUT /api/v1/documents/:key
pub async fn handle_put_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(candidate): Json<Value>,
) -> Result<Json<ResumeDocument>, AppError> {
    let document = match state.gateway.validator().validate(&candidate) {
        Validation::Valid(document) => document,
        Validation::Invalid(errors) => return Err(AppError::InvalidDocument(errors)),
    };
    state.gateway.write(&key, &document).await?;
    Ok(Json(document))
}

/// DELETE /api/v1/documents/:key
pub async fn handle_reset_document(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<StatusCode, AppError> {
    state.gateway.reset(&key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/v1/documents/:key/backups
pub async fn handle_list_backups(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<Vec<Snapshot>> {
    Json(state.gateway.backups().list(&key).await)
}

/// POST /api/v1/documents/:key/backups/restore
pub async fn handle_restore_backup(
    State(state): State<AppState>,
    Path(key): Path<String>,
    body: Option<Json<RestoreRequest>>,
) -> Result<Json<ResumeDocument>, AppError> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    state
        .gateway
        .restore(&key, request.timestamp)
        .await?
        .map(Json)
        .ok_or_else(|| match request.timestamp {
            Some(ts) => AppError::NotFound(format!("No backup of '{key}' taken at {ts}")),
            None => AppError::NotFound(format!("No backups of '{key}'")),
        })
}

/// GET /api/v1/documents/:key/export
pub async fn handle_export(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<BackupPayload>, AppError> {
    let loaded = state
        .gateway
        .read(&key)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No document stored under '{key}'")))?;
    Ok(Json(state.gateway.backups().export_for_backup(&loaded.document)))
}

/// POST /api/v1/documents/:key/import
/// Body is the raw export file.
pub async fn handle_import(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: String,
) -> Result<Json<ResumeDocument>, AppError> {
    if payload.trim().is_empty() {
        return Err(AppError::Validation("Backup file is empty".to_string()));
    }
    Ok(Json(state.gateway.import(&key, &payload).await?))
}

//! Persistence gateway, the only read/write path between the UI and the store.
//!
//! Read: raw text → parse → migrate → validate → (recover) → self-heal.
//! A document returned from here always validates.
//!
//! Write: snapshot first, then store with a short retry for transient
//! failures. Failures are returned, never raised, and leave the previous
//! value in place.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::integrity::{
    DocumentSchema, PartialRecoveryEngine, RecoveredField, SchemaValidator, Validation,
    ValidationError, VersionMigrator,
};
use crate::models::document::ResumeDocument;
use crate::resilience::{Clock, OperationError, ResilientExecutor, RetryPolicy};
use crate::storage::backup::{BackupManager, ImportError, DEFAULT_CAPACITY};
use crate::storage::{document_key, KeyValueStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LoadSource {
    /// Stored value was valid as-is.
    Stored,
    /// Stored value validated after version transforms.
    Migrated { from_version: u32 },
    /// Stored value was salvaged by partial recovery.
    Recovered,
    /// Nothing was stored; a new empty document was created.
    Created,
}

/// A sanitized document plus what happened on the way out of storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedDocument {
    pub document: ResumeDocument,
    pub source: LoadSource,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<String>,
    /// Non-empty only after recovery; the UI offers restore/export/import/reset
    /// whenever it is.
    pub recovered_fields: Vec<RecoveredField>,
}

impl LoadedDocument {
    fn clean(document: ResumeDocument, source: LoadSource) -> Self {
        Self {
            document,
            source,
            errors: Vec::new(),
            warnings: Vec::new(),
            recovered_fields: Vec::new(),
        }
    }

    pub fn needs_attention(&self) -> bool {
        !self.recovered_fields.is_empty()
    }
}

#[derive(Debug, Error)]
pub enum StorageWriteFailure {
    #[error("document could not be serialized: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("storage write failed: {0}")]
    Store(OperationError),

    #[error("storage cleanup failed: {0}")]
    Cleanup(#[from] StoreError),
}

/// What a store lookup produced, before it is collapsed for callers.
enum ReadOutcome {
    Loaded(LoadedDocument),
    /// Nothing stored, or a sentinel.
    Absent,
    /// Stored text was unusable and has been deleted.
    Discarded,
    /// The store itself failed; the entry may still hold a good document.
    Unreadable(StoreError),
}

pub struct PersistenceGateway {
    store: Arc<dyn KeyValueStore>,
    validator: SchemaValidator,
    migrator: VersionMigrator,
    recovery: PartialRecoveryEngine,
    backups: BackupManager,
    executor: ResilientExecutor,
    write_policy: RetryPolicy,
}

impl PersistenceGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self::with_schema(store, clock, Arc::new(DocumentSchema::resume()), DEFAULT_CAPACITY)
    }

    pub fn with_schema(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        schema: Arc<DocumentSchema>,
        backup_capacity: usize,
    ) -> Self {
        let validator = SchemaValidator::new(schema);
        Self {
            backups: BackupManager::new(
                Arc::clone(&store),
                Arc::clone(&clock),
                validator.clone(),
                backup_capacity,
            ),
            migrator: VersionMigrator::new(validator.clone()),
            recovery: PartialRecoveryEngine::new(validator.clone()),
            executor: ResilientExecutor::new(clock),
            write_policy: RetryPolicy::default()
                .with_max_attempts(3)
                .with_delays(Duration::from_millis(50), Duration::from_millis(500)),
            validator,
            store,
        }
    }

    pub fn with_write_policy(mut self, policy: RetryPolicy) -> Self {
        self.write_policy = policy;
        self
    }

    pub fn validator(&self) -> &SchemaValidator {
        &self.validator
    }

    pub fn backups(&self) -> &BackupManager {
        &self.backups
    }

    /// Loads the document stored under `key`.
    ///
    /// Returns `None` when nothing usable is stored: absent, sentinel text,
    /// unparseable text (the entry is deleted), an unrecoverable document
    /// (deleted), or an unreadable store.
    pub async fn read(&self, key: &str) -> Option<LoadedDocument> {
        match self.load(key).await {
            ReadOutcome::Loaded(loaded) => Some(loaded),
            ReadOutcome::Absent | ReadOutcome::Discarded | ReadOutcome::Unreadable(_) => None,
        }
    }

    /// Like [`read`](Self::read), but creates and stores an empty document
    /// when nothing usable is stored. A store read failure is returned and
    /// nothing is written, so an unreadable document is never replaced.
    pub async fn read_or_default(&self, key: &str) -> Result<LoadedDocument, StoreError> {
        match self.load(key).await {
            ReadOutcome::Loaded(loaded) => Ok(loaded),
            ReadOutcome::Unreadable(e) => Err(e),
            ReadOutcome::Absent | ReadOutcome::Discarded => {
                let document = ResumeDocument::default();
                if let Err(e) = self.store_document(key, &document).await {
                    warn!(key, error = %e, "Could not persist new empty document");
                }
                Ok(LoadedDocument::clean(document, LoadSource::Created))
            }
        }
    }

    async fn load(&self, key: &str) -> ReadOutcome {
        let raw = match self.store.read_value(&document_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ReadOutcome::Absent,
            Err(e) => {
                error!(key, error = %e, "Failed to read from store");
                return ReadOutcome::Unreadable(e);
            }
        };

        let parsed: Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Stored document is not valid JSON; discarding");
                self.discard(key).await;
                return ReadOutcome::Discarded;
            }
        };

        // A non-object root cannot be migrated; recovery handles it below.
        let (candidate, from_version) = match self.migrator.upgrade(&parsed) {
            Ok(upgrade) if upgrade.applied() => (upgrade.value, Some(upgrade.from_version)),
            Ok(upgrade) => (upgrade.value, None),
            Err(e) => {
                warn!(key, error = %e, "Stored document could not be migrated");
                (parsed.clone(), None)
            }
        };

        let loaded = match self.validator.validate(&candidate) {
            Validation::Valid(document) => {
                let source = match from_version {
                    Some(from_version) => {
                        info!(key, from_version, "Migrated stored document");
                        LoadSource::Migrated { from_version }
                    }
                    None => LoadSource::Stored,
                };
                LoadedDocument::clean(document, source)
            }
            Validation::Invalid(errors) => {
                warn!(key, errors = errors.len(), "Stored document is invalid; recovering");
                match self.recovery.recover(&candidate, errors) {
                    Ok(report) => LoadedDocument {
                        document: report.document,
                        source: LoadSource::Recovered,
                        errors: report.errors,
                        warnings: report.warnings,
                        recovered_fields: report.recovered_fields,
                    },
                    Err(e) => {
                        error!(key, error = %e, "Stored document is unrecoverable; discarding");
                        self.discard(key).await;
                        return ReadOutcome::Discarded;
                    }
                }
            }
        };

        self.heal(key, &parsed, &loaded.document).await;
        ReadOutcome::Loaded(loaded)
    }

    /// Snapshots `document`, then stores it. Last write wins.
    pub async fn write(&self, key: &str, document: &ResumeDocument) -> Result<(), StorageWriteFailure> {
        if let Err(e) = self.backups.snapshot(key, document).await {
            warn!(key, error = %e, "Backup snapshot failed; writing anyway");
        }
        self.store_document(key, document).await
    }

    /// Restores the snapshot taken at `timestamp` (or the latest one) and
    /// writes it back as the live document.
    pub async fn restore(
        &self,
        key: &str,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Option<ResumeDocument>, StorageWriteFailure> {
        let snapshot = match timestamp {
            Some(ts) => self.backups.restore(key, ts).await,
            None => self.backups.restore_latest(key).await,
        };
        let Some(snapshot) = snapshot else {
            return Ok(None);
        };
        self.write(key, &snapshot.document).await?;
        info!(key, timestamp = %snapshot.timestamp, "Restored document from backup");
        Ok(Some(snapshot.document))
    }

    /// Validates a backup file and, only if it is valid, makes it the live
    /// document.
    pub async fn import(&self, key: &str, payload: &str) -> Result<ResumeDocument, ImportError> {
        let document = self.backups.import_from_backup(payload)?;
        if let Err(e) = self.write(key, &document).await {
            error!(key, error = %e, "Imported document could not be stored");
            return Err(ImportError::Store(e.to_string()));
        }
        Ok(document)
    }

    /// Explicit user reset: deletes the document and its backups.
    pub async fn reset(&self, key: &str) -> Result<(), StorageWriteFailure> {
        self.store.remove(&document_key(key)).await?;
        self.backups.clear(key).await?;
        info!(key, "Document reset");
        Ok(())
    }

    async fn store_document(&self, key: &str, document: &ResumeDocument) -> Result<(), StorageWriteFailure> {
        let serialized = serde_json::to_string(document)?;
        let owned_key = document_key(key);
        let storage_key = owned_key.as_str();
        let store = Arc::clone(&self.store);
        self.executor
            .retry_with_backoff(
                || {
                    let store = Arc::clone(&store);
                    let serialized = serialized.clone();
                    async move {
                        store
                            .set(storage_key, &serialized)
                            .await
                            .map_err(OperationError::from)
                    }
                },
                &self.write_policy,
            )
            .await
            .map_err(|e| {
                error!(key, error = %e, "Failed to write document");
                StorageWriteFailure::Store(e)
            })
    }

    /// Writes the sanitized form back when it differs from what was stored.
    async fn heal(&self, key: &str, stored: &Value, document: &ResumeDocument) {
        let sanitized = match serde_json::to_value(document) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Could not serialize sanitized document");
                return;
            }
        };
        if &sanitized == stored {
            return;
        }
        match self.store_document(key, document).await {
            Ok(()) => info!(key, "Stored document self-healed"),
            Err(e) => warn!(key, error = %e, "Self-heal write failed"),
        }
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.store.remove(&document_key(key)).await {
            warn!(key, error = %e, "Failed to delete corrupted entry");
        }
    }
}

//! Bounded snapshot history plus portable export/import.
//!
//! For a document stored under `key`, the newest-first history lives under
//! `backups:{key}` and the single most recent snapshot under
//! `latest-backup:{key}`, so restoring the latest never parses the history.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::integrity::{SchemaValidator, Validation, ValidationError, VersionMigrator};
use crate::models::document::ResumeDocument;
use crate::resilience::Clock;
use crate::storage::{history_key, latest_key, KeyValueStore, StoreError};

pub const DEFAULT_CAPACITY: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub document_version: u32,
    pub document: ResumeDocument,
}

/// Portable backup file: `{version, timestamp, data}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupPayload {
    pub version: u32,
    /// RFC 3339 / ISO-8601.
    pub timestamp: String,
    pub data: ResumeDocument,
}

impl BackupPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("backup is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("backup has no 'data' object")]
    MissingData,

    #[error("backup data cannot be migrated: {0}")]
    Migration(#[from] crate::integrity::MigrationError),

    #[error("backup failed validation with {} error(s); first: {}", .0.len(), first_error(.0))]
    Invalid(Vec<ValidationError>),

    #[error("imported document could not be stored: {0}")]
    Store(String),
}

fn first_error(errors: &[ValidationError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_default()
}

pub struct BackupManager {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    validator: SchemaValidator,
    migrator: VersionMigrator,
    capacity: usize,
}

impl BackupManager {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        validator: SchemaValidator,
        capacity: usize,
    ) -> Self {
        Self {
            store,
            clock,
            migrator: VersionMigrator::new(validator.clone()),
            validator,
            capacity: capacity.max(1),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pushes a snapshot of `document` to the front of the history, evicting
    /// the oldest entries beyond capacity, and refreshes the latest slot.
    pub async fn snapshot(
        &self,
        key: &str,
        document: &ResumeDocument,
    ) -> Result<Snapshot, StoreError> {
        let snapshot = Snapshot {
            timestamp: self.clock.now(),
            document_version: document.version,
            document: document.clone(),
        };

        let mut history = self.load_history(key).await;
        history.insert(0, snapshot.clone());
        if history.len() > self.capacity {
            let evicted = history.len() - self.capacity;
            history.truncate(self.capacity);
            debug!(key, evicted, "Evicted oldest backups");
        }

        self.store
            .set(&history_key(key), &serde_json::to_string(&history)?)
            .await?;
        self.store
            .set(&latest_key(key), &serde_json::to_string(&snapshot)?)
            .await?;

        debug!(key, entries = history.len(), "Backup snapshot stored");
        Ok(snapshot)
    }

    /// Snapshots, newest first.
    pub async fn list(&self, key: &str) -> Vec<Snapshot> {
        self.load_history(key).await
    }

    pub async fn restore_latest(&self, key: &str) -> Option<Snapshot> {
        let latest = match self.store.read_value(&latest_key(key)).await {
            Ok(Some(raw)) => self.parse_snapshot(key, &raw),
            Ok(None) => None,
            Err(e) => {
                warn!(key, error = %e, "Could not read latest backup");
                None
            }
        };
        match latest {
            Some(snapshot) => Some(snapshot),
            None => self.load_history(key).await.into_iter().next(),
        }
    }

    /// The snapshot taken exactly at `timestamp`, if any.
    pub async fn restore(&self, key: &str, timestamp: DateTime<Utc>) -> Option<Snapshot> {
        self.load_history(key)
            .await
            .into_iter()
            .find(|s| s.timestamp == timestamp)
    }

    /// Drops the history and the latest slot.
    pub async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.store.remove(&history_key(key)).await?;
        self.store.remove(&latest_key(key)).await?;
        info!(key, "Backups cleared");
        Ok(())
    }

    pub fn export_for_backup(&self, document: &ResumeDocument) -> BackupPayload {
        BackupPayload {
            version: document.version,
            timestamp: self.clock.now().to_rfc3339_opts(SecondsFormat::Millis, true),
            data: document.clone(),
        }
    }

    /// Parses a backup file, migrates its data forward and validates it.
    /// Nothing is written: the caller decides whether to replace live state.
    pub fn import_from_backup(&self, payload: &str) -> Result<ResumeDocument, ImportError> {
        let parsed: Value = serde_json::from_str(payload)?;
        let mut data = match parsed.get("data") {
            Some(data @ Value::Object(_)) => data.clone(),
            _ => return Err(ImportError::MissingData),
        };

        // Older exports carried the version only on the envelope.
        if data.get("version").is_none() {
            if let Some(version) = parsed.get("version") {
                data["version"] = version.clone();
            }
        }

        let upgraded = self.migrator.upgrade(&data)?;
        match self.validator.validate(&upgraded.value) {
            Validation::Valid(document) => Ok(document),
            Validation::Invalid(errors) => {
                warn!(errors = errors.len(), "Rejected invalid backup import");
                Err(ImportError::Invalid(errors))
            }
        }
    }

    async fn load_history(&self, key: &str) -> Vec<Snapshot> {
        let raw = match self.store.read_value(&history_key(key)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                warn!(key, error = %e, "Could not read backup history");
                return Vec::new();
            }
        };

        let entries: Vec<Value> = match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(key, error = %e, "Backup history is corrupted; starting a new one");
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| self.parse_snapshot_value(key, entry))
            .collect()
    }

    fn parse_snapshot(&self, key: &str, raw: &str) -> Option<Snapshot> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => self.parse_snapshot_value(key, value),
            Err(e) => {
                warn!(key, error = %e, "Latest backup is corrupted");
                None
            }
        }
    }

    /// Snapshots whose document no longer validates are skipped.
    fn parse_snapshot_value(&self, key: &str, value: Value) -> Option<Snapshot> {
        let document_value = value.get("document")?.clone();
        if !self.validator.validate(&document_value).is_valid() {
            warn!(key, "Skipping backup snapshot that no longer validates");
            return None;
        }
        serde_json::from_value(value)
            .map_err(|e| warn!(key, error = %e, "Skipping malformed backup snapshot"))
            .ok()
    }
}

// Local persistence: key/value store adapters, the sanitizing gateway and the
// bounded backup history.
//
// The store is shared with last-write-wins semantics. There is no locking
// across processes, so two writers to the same profile can overwrite each
// other.

pub mod backup;
pub mod file;
pub mod gateway;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::resilience::OperationError;

pub use backup::{BackupManager, BackupPayload, ImportError, Snapshot};
pub use file::FileStore;
pub use gateway::{LoadSource, LoadedDocument, PersistenceGateway, StorageWriteFailure};
pub use memory::MemoryStore;

/// Stored text that the browser-era payloads used to mean "no value".
const ABSENT_SENTINELS: &[&str] = &["undefined", "null"];

// Each kind of entry gets its own colon-free prefix, so no document key can
// address a backup entry and vice versa.
pub(crate) fn document_key(key: &str) -> String {
    format!("doc:{key}")
}

pub(crate) fn history_key(key: &str) -> String {
    format!("backups:{key}")
}

pub(crate) fn latest_key(key: &str) -> String {
    format!("latest-backup:{key}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage quota exceeded writing '{key}' ({needed} bytes, {available} available)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        available: usize,
    },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Quota and serialization failures will not succeed on retry.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            StoreError::QuotaExceeded { .. } | StoreError::Serialization(_)
        )
    }
}

impl From<StoreError> for OperationError {
    fn from(e: StoreError) -> Self {
        if e.is_permanent() {
            OperationError::Rejected(e.to_string())
        } else {
            OperationError::Failed(e.to_string())
        }
    }
}

/// String-keyed, string-valued store.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Raw stored text, sentinels included.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    /// Removing a missing key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Stored text with the `"undefined"` / `"null"` sentinels mapped to
    /// `None`. Callers outside this module only ever use this.
    async fn read_value(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .get(key)
            .await?
            .filter(|raw| !ABSENT_SENTINELS.contains(&raw.trim())))
    }
}
